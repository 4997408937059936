//! Service layer modules

pub mod validation;
