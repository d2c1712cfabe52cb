pub mod command;
pub mod fastx;
pub mod file;
pub mod manifest;
pub mod paths;
pub mod script;
pub mod system;
