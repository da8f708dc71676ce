pub mod dap;
pub mod engine;
