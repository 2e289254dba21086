/// Router Module Index
///
/// Routes are split by who may reach them; the gates are applied as layers in
/// `create_router`, never inside the handlers.

/// Routes anyone can reach.
pub mod public;

/// Routes behind the auth, lock and confirm gates.
pub mod authenticated;
