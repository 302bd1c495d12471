#[macro_use]
extern crate log;
extern crate pam_client2 as pam_client;

pub mod app;
pub mod auth;
pub mod common;
pub mod display;
pub mod fs;
pub mod helper;
pub mod ipc;
pub mod session;
