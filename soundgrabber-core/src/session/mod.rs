pub mod capture;
pub mod supervisor;
