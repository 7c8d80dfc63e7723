/// Max tenants (partners) loaded by one process.
pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

/// Availability rules a single team member may carry.
pub const MAX_RULES_PER_TEAM_MEMBER: usize = 512;
/// Working + special hours entries per shop.
pub const MAX_HOURS_PER_SHOP: usize = 1024;

/// Applies to `notes`, `customer_notes` and `cancellation_reason`.
pub const MAX_NOTES_LEN: usize = 2000;

/// Longest bookable service, in minutes. Anything longer cannot fit a single day anyway.
pub const MAX_DURATION_MINUTES: i32 = 24 * 60;

/// Bounds for the slot walk step.
pub const MIN_SLOT_STEP_MINUTES: i32 = 1;
pub const MAX_SLOT_STEP_MINUTES: i32 = 12 * 60;
