// =============================================================================
// HTTP control surface
// =============================================================================

pub mod rest;
