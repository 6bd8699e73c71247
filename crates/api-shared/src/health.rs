use crate::dto::HealthRes;

/// Liveness report served on `GET /health`.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Static method to check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "MDR is alive".into(),
        }
    }
}
