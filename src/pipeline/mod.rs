pub mod encoding;
pub mod features;
pub mod predictor;
pub mod record;
pub mod timestamp;
