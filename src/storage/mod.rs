pub mod layout;
pub mod parameter;
pub mod journal;
pub mod file_lock;
pub mod scanner;
