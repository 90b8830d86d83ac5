pub mod inbox;
pub mod instances;
pub mod templates;
