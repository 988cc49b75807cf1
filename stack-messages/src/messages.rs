//! Central registry for all user-facing message templates.
//!
//! Naming Convention:
//! - `common_*` - Shared messages across commands
//! - `{component}_*` - Component specific messages (service_, health_, update_, ...)
//!
//! Templates use `{variable}` syntax for runtime values, which are
//! substituted by the `MessageBuilder`.

pub struct Messages {
    // ============================================================================
    // Common Messages
    // ============================================================================
    pub common_error: &'static str,
    pub common_hint: &'static str,
    pub common_output_tail: &'static str,

    // ============================================================================
    // Environment
    // ============================================================================
    pub env_degraded: &'static str,
    pub env_using: &'static str,

    // ============================================================================
    // Service Lifecycle
    // ============================================================================
    pub service_starting: &'static str,
    pub service_started: &'static str,
    pub service_stopping: &'static str,
    pub service_stopped: &'static str,
    pub service_restarting: &'static str,
    pub service_restarted: &'static str,
    pub service_pulling: &'static str,
    pub service_pulled: &'static str,
    pub stack_down: &'static str,
    pub all_services: &'static str,

    // ============================================================================
    // Health
    // ============================================================================
    pub health_waiting: &'static str,
    pub health_ready: &'static str,
    pub health_timeout: &'static str,
    pub health_summary: &'static str,
    pub health_row: &'static str,

    // ============================================================================
    // Credentials
    // ============================================================================
    pub credentials_checking: &'static str,
    pub credentials_ok: &'static str,
    pub credentials_mismatch: &'static str,
    pub credentials_confirm_reset: &'static str,
    pub credentials_reset_done: &'static str,
    pub credentials_reset_failed: &'static str,
    pub credentials_reset_declined: &'static str,

    // ============================================================================
    // Networks
    // ============================================================================
    pub network_checking: &'static str,
    pub network_no_conflicts: &'static str,
    pub network_conflict_found: &'static str,
    pub network_confirm_remove: &'static str,
    pub network_removed: &'static str,
    pub network_in_use: &'static str,

    // ============================================================================
    // Updates
    // ============================================================================
    pub update_starting: &'static str,
    pub update_success: &'static str,
    pub update_failed: &'static str,
    pub update_rolled_back: &'static str,
    pub update_summary: &'static str,

    // ============================================================================
    // Registry
    // ============================================================================
    pub registry_login_failed: &'static str,

    // ============================================================================
    // Validation
    // ============================================================================
    pub validate_ok: &'static str,
}

pub const MESSAGES: Messages = Messages {
    // Common
    common_error: "❌ {error}",
    common_hint: "💡 {hint}",
    common_output_tail: "   Output (last lines):\n{output}",

    // Environment
    env_degraded: "No environment file found; continuing with runtime defaults",
    env_using: "Using compose file {compose} (project {project})",

    // Service Lifecycle
    service_starting: "▶ Starting {service}...",
    service_started: "✓ {service} started",
    service_stopping: "▶ Stopping {service}...",
    service_stopped: "✓ {service} stopped",
    service_restarting: "▶ Restarting {service}...",
    service_restarted: "✓ {service} restarted",
    service_pulling: "▶ Pulling images for {service}...",
    service_pulled: "✓ Images for {service} pulled",
    stack_down: "✓ All services removed",
    all_services: "all services",

    // Health
    health_waiting: "⏳ Waiting for {target} to become healthy (timeout {timeout}s)...",
    health_ready: "{target} healthy",
    health_timeout: "{target} did not become healthy within {timeout}s",
    health_summary: "{healthy}/{total} services healthy",
    health_row: "  {service} {container} {image} {status}",

    // Credentials
    credentials_checking: "Checking database credentials against existing data...",
    credentials_ok: "Database credentials match the existing data",
    credentials_mismatch: "Database credentials do not match the existing database volume",
    credentials_confirm_reset: "Remove the database volume so it is recreated with the current credentials? ALL DATABASE DATA WILL BE LOST",
    credentials_reset_done: "Database volume removed; it will be recreated on next start",
    credentials_reset_failed: "Failed to remove database volume: {error}",
    credentials_reset_declined: "Database volume left in place; start will fail until credentials match",

    // Networks
    network_checking: "Checking for Docker network subnet conflicts on {subnet}...",
    network_no_conflicts: "No conflicting networks",
    network_conflict_found: "Network {network} ({subnet}) conflicts with {target}",
    network_confirm_remove: "Remove unused conflicting network {network}?",
    network_removed: "Removed unused network {network}",
    network_in_use: "Network {network} conflicts but has {count} attached container(s); leaving it in place",

    // Updates
    update_starting: "Updating {service}: {previous} → {tag}",
    update_success: "{service} updated to {tag}",
    update_failed: "❌ Update of {service} failed: {error}",
    update_rolled_back: "{service} version rolled back to {tag}",
    update_summary: "{succeeded} succeeded, {failed} failed",

    // Registry
    registry_login_failed: "Registry login to {registry} failed ({reason}); continuing without authentication",

    // Validation
    validate_ok: "Compose configuration is valid",
};
