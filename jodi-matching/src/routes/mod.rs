pub mod candidates;
pub mod distribution;
pub mod health;
pub mod lookups;
pub mod preferences;
pub mod profiles;
