//! # PTS Terminal Entry Point
//!
//! Starts the terminal against a simulated controller and keeps the pump
//! board in sync until Ctrl+C.
//!
//! The actual setup is in lib.rs so it can be tested.

#[tokio::main]
async fn main() -> Result<(), pts_terminal::error::ApiError> {
    pts_terminal::run().await
}
