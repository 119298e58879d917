//! Stateless repositories — every method takes `&Connection`.

pub mod lane;
pub mod lineage;
pub mod record;
