/// Database layer: connection pooling and embedded schema migrations.
///
/// Models and their queries live in [`crate::models`].

pub mod migrations;
pub mod pool;
