//! Domain primitives, ports, and the fixture set.
//!
//! Purpose: define the user entity, its validation rules, the request
//! context threaded through every repository call, and the ports that
//! persistence adapters implement.
//!
//! Public surface:
//! - User / NewUser / UserId: stored and unsaved user values.
//! - validate_user_fields / is_valid: the format predicate.
//! - RequestContext / TraceId: per-request cancellation, deadline, and
//!   correlation.
//! - ports: `UserRepository` and `KeyValueStore` with their errors.

pub mod context;
pub mod fixtures;
pub mod ports;
pub mod trace_id;
pub mod user;

pub use self::context::RequestContext;
pub use self::trace_id::TraceId;
pub use self::user::{
    EMAIL_MAX, NewUser, SCREEN_NAME_MAX, User, UserId, UserValidationError, is_valid,
    validate_user_fields,
};
