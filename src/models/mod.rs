pub mod artifacts;
pub mod xgboost;
