pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod panel;
pub mod process;
pub mod rebase;
pub mod regions;
