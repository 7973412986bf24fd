// ============================================================================
// LAYER OPERATIONS — per-layer pixel work used by the effect pipeline
// ============================================================================

pub mod filters;
pub mod mask;
pub mod text;
pub mod transform;
