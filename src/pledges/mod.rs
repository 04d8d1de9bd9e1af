// Pledge lifecycle: creation, cancellation, previews, funding snapshots
pub mod models;
pub mod service;
