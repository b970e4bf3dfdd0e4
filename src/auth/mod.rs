pub mod authority;
pub(crate) mod extractors;
pub mod password;
