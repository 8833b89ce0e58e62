//! Simulated pump and valve switches. Nothing here drives real hardware.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Unknown pump: {0}")]
    UnknownPump(String),
    #[error("Unknown valve: {0}")]
    UnknownValve(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub pump_main: bool,
    pub valve_inlet: bool,
    pub valve_outlet: bool,
    pub auto_mode: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            pump_main: false,
            valve_inlet: false,
            valve_outlet: true,
            auto_mode: true,
        }
    }
}

impl ControlState {
    fn pump_mut(&mut self, pump_id: &str) -> Option<&mut bool> {
        match pump_id {
            "main" => Some(&mut self.pump_main),
            _ => None,
        }
    }

    fn valve_mut(&mut self, valve_id: &str) -> Option<&mut bool> {
        match valve_id {
            "inlet" => Some(&mut self.valve_inlet),
            "outlet" => Some(&mut self.valve_outlet),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ControlPanel {
    inner: Arc<RwLock<ControlState>>,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ControlState {
        *self.inner.read().await
    }

    pub async fn set_pump(&self, pump_id: &str, on: bool) -> Result<(), ControlError> {
        let mut guard = self.inner.write().await;
        let slot = guard
            .pump_mut(pump_id)
            .ok_or_else(|| ControlError::UnknownPump(pump_id.to_string()))?;
        *slot = on;
        Ok(())
    }

    pub async fn set_valve(&self, valve_id: &str, open: bool) -> Result<(), ControlError> {
        let mut guard = self.inner.write().await;
        let slot = guard
            .valve_mut(valve_id)
            .ok_or_else(|| ControlError::UnknownValve(valve_id.to_string()))?;
        *slot = open;
        Ok(())
    }

    pub async fn set_auto_mode(&self, enabled: bool) {
        self.inner.write().await.auto_mode = enabled;
    }

    pub async fn reset(&self) {
        *self.inner.write().await = ControlState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_outlet_open_and_auto_mode() {
        let panel = ControlPanel::new();
        let state = panel.snapshot().await;
        assert!(!state.pump_main);
        assert!(!state.valve_inlet);
        assert!(state.valve_outlet);
        assert!(state.auto_mode);
    }

    #[tokio::test]
    async fn switches_known_actuators() {
        let panel = ControlPanel::new();
        panel.set_pump("main", true).await.expect("pump");
        panel.set_valve("outlet", false).await.expect("valve");
        panel.set_auto_mode(false).await;
        let state = panel.snapshot().await;
        assert!(state.pump_main);
        assert!(!state.valve_outlet);
        assert!(!state.auto_mode);

        panel.reset().await;
        assert_eq!(panel.snapshot().await, ControlState::default());
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let panel = ControlPanel::new();
        let err = panel.set_pump("backup", true).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown pump: backup");
        assert_eq!(
            panel.set_valve("drain", true).await,
            Err(ControlError::UnknownValve("drain".into()))
        );
        assert_eq!(panel.snapshot().await, ControlState::default());
    }
}
