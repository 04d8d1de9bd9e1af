// Pledge redistribution math
pub mod engine;

pub use engine::{
    can_accept_pledge, max_people, optimize, preview_for_new_pledger, OptimizationResult,
    PledgePreview,
};
