pub mod cancel;
pub mod controller;
pub mod plan_store;
pub mod retry;
