/**
 * Hardware-system contract
 *
 * The pieces a control framework needs to drive a hardware plugin:
 * - the robot description handed over at initialization
 * - the lifecycle states and the `SystemInterface` trait
 * - state/command handles bound to the plugin's joint buffers
 */

pub mod handle;
pub mod registry;

pub use handle::{CommandInterface, SlotBank, StateInterface};
pub use registry::JointInterfaceRegistry;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ArmError, Result};

pub const HW_IF_POSITION: &str = "position";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceInfo{
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JointInfo{
    pub name: String,
    #[serde(default)]
    pub state_interfaces: Vec<InterfaceInfo>,
    #[serde(default)]
    pub command_interfaces: Vec<InterfaceInfo>,
}

impl JointInfo{
    /// Joint exposing `position` as both state and command interface.
    pub fn position(name: &str) -> Self{
        let iface = InterfaceInfo{ name: HW_IF_POSITION.to_string() };
        JointInfo{
            name: name.to_string(),
            state_interfaces: vec![iface.clone()],
            command_interfaces: vec![iface],
        }
    }
}

/// Robot description of one hardware system, as the framework hands it over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HardwareInfo{
    pub name: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub joints: Vec<JointInfo>,
}

impl HardwareInfo{
    pub fn from_toml_str(text: &str) -> Result<Self>{
        toml::from_str(text).map_err(|e| ArmError::Description(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self>{
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ArmError::Description(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self{
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }
}

/// Checks every plugin relies on before its own initialization runs.
pub fn validate_info(info: &HardwareInfo) -> Result<()>{
    if info.name.trim().is_empty(){
        return Err(ArmError::BaseInit("hardware system has no name".to_string()));
    }
    if let Some(pos) = info.joints.iter().position(|j| j.name.trim().is_empty()){
        return Err(ArmError::BaseInit(format!("joint #{} has no name", pos)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState{
    Unconfigured,
    Inactive,
    Active,
    Finalized,
}

/// Lifecycle and data-exchange operations a hardware system plugin provides.
///
/// The framework calls `on_init` once, then moves the plugin between
/// `Inactive` and `Active`. While active it calls `read` then `write` once
/// per control cycle.
pub trait SystemInterface: Send{
    fn on_init(&mut self, info: HardwareInfo) -> Result<()>;

    fn on_activate(&mut self, previous: LifecycleState) -> Result<()>;

    fn on_deactivate(&mut self, previous: LifecycleState) -> Result<()>;

    fn on_shutdown(&mut self, previous: LifecycleState) -> Result<()>;

    fn export_state_interfaces(&self) -> Vec<StateInterface>;

    fn export_command_interfaces(&self) -> Vec<CommandInterface>;

    fn read(&mut self, time: Duration, period: Duration) -> Result<()>;

    fn write(&mut self, time: Duration, period: Duration) -> Result<()>;

    fn lifecycle_state(&self) -> LifecycleState;
}
