//! Component health for liveness and readiness probes
//!
//! The flush scheduler and the bridge builder report the state of the
//! buffer, scheduler, transmitter and aggregator here; the agent serves
//! the aggregate on `/healthz` and `/readyz`.

use crate::status::TransmissionHealth;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is working as expected
    Healthy,
    /// Still moving data, but something needs attention
    Degraded,
    /// Component has stopped or keeps failing
    Unhealthy,
}

impl ComponentStatus {
    /// True for healthy and degraded components
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Latest health report of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Healthy report without a message
    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    /// Degraded report carrying the reason
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    /// Unhealthy report carrying the reason
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }

    /// Map the transmission tracker's verdict onto a component status.
    /// `Unknown` (nothing sent yet) counts as healthy.
    pub fn from_transmission(health: TransmissionHealth, detail: Option<String>) -> Self {
        match health {
            TransmissionHealth::Unknown | TransmissionHealth::Healthy => Self::healthy(),
            TransmissionHealth::Degraded => {
                Self::degraded(detail.unwrap_or_else(|| "transmissions failing".to_string()))
            }
            TransmissionHealth::Unhealthy => {
                Self::unhealthy(detail.unwrap_or_else(|| "transmissions failing".to_string()))
            }
        }
    }
}

/// Overall status plus every component's report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among components; empty means healthy
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .fold(ComponentStatus::Healthy, |worst, s| match (worst, s) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Readiness verdict with the reason when not ready
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    /// Three-tier point buffer; degraded near the hard cap
    pub const BUFFER: &str = "buffer";
    /// Flush task; unhealthy once stopped
    pub const SCHEDULER: &str = "scheduler";
    /// Follows the transmission tracker's verdict
    pub const TRANSMITTER: &str = "transmitter";
    pub const AGGREGATOR: &str = "aggregator";
}

/// Shared registry of component health and the readiness flag
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Empty registry, not ready
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Replace a component's report
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    /// Mark a component healthy
    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Mark a component degraded with a reason
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Mark a component unhealthy with a reason
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Set the readiness flag; cleared when the bridge stops
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Snapshot of every component and the worst status among them
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready when the flag is set and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let status = self.health().await.status;

        let reason = if !ready {
            Some("Bridge not started or already stopped".to_string())
        } else if status == ComponentStatus::Unhealthy {
            Some("Component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_register_components() {
        let registry = HealthRegistry::new();
        registry.register(components::BUFFER).await;
        registry.register(components::SCHEDULER).await;

        let health = registry.health().await;
        assert_eq!(health.components.len(), 2);
        assert_eq!(
            health.components[components::BUFFER].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let registry = HealthRegistry::new();
        registry.register(components::BUFFER).await;
        registry.register(components::TRANSMITTER).await;
        registry.register(components::AGGREGATOR).await;

        registry
            .set_degraded(components::BUFFER, "near hard cap")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(components::TRANSMITTER, "5 consecutive failures")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.set_healthy(components::TRANSMITTER).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::SCHEDULER).await;
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(components::SCHEDULER, "stopped")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[test]
    fn test_from_transmission() {
        let h = ComponentHealth::from_transmission(TransmissionHealth::Unknown, None);
        assert_eq!(h.status, ComponentStatus::Healthy);
        let h = ComponentHealth::from_transmission(
            TransmissionHealth::Unhealthy,
            Some("timeout".to_string()),
        );
        assert_eq!(h.status, ComponentStatus::Unhealthy);
        assert_eq!(h.message.as_deref(), Some("timeout"));
    }
}
