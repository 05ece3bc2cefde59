pub mod auth;
pub mod backend;
pub mod cert;
pub mod dns;
pub mod site;
