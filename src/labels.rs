// ABOUTME: Label keys written to containers and read from image configs.
// ABOUTME: The `gordon.*` namespace is the wire format shared with the proxy.

/// Marks a container as owned by this orchestrator.
pub const MANAGED: &str = "gordon.managed";
/// The route domain a main container serves.
pub const DOMAIN: &str = "gordon.domain";
/// The image reference exactly as the user wrote it in the route.
pub const IMAGE: &str = "gordon.image";
/// The route key, mirrored for the proxy's benefit.
pub const ROUTE: &str = "gordon.route";
/// Marks an attachment (side-car) container.
pub const ATTACHMENT: &str = "gordon.attachment";
/// The owner domain of an attachment.
pub const ATTACHED_TO: &str = "gordon.attached-to";

/// Image labels consumed by the auto-route resolver.
pub const IMAGE_DOMAIN: &str = "gordon.domain";
pub const IMAGE_DOMAINS: &str = "gordon.domains";
pub const IMAGE_HEALTH: &str = "gordon.health";
pub const IMAGE_PORT: &str = "gordon.port";
pub const IMAGE_ENV_FILE: &str = "gordon.env-file";
