/**
 * Arm System
 *
 * Lifecycle:
 * 1. on_init: size joint buffers, register joint names per interface kind
 * 2. on_activate: open + lock + configure the serial device
 * 3. read: report commanded positions as state (no encoder feedback yet)
 * 4. write: send the command buffer to the arm controller
 * 5. on_deactivate / on_shutdown: release the device
 */

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ArmError, Result};
use crate::hardware::{
    self, CommandInterface, HardwareInfo, JointInterfaceRegistry, LifecycleState, SlotBank,
    StateInterface, SystemInterface, HW_IF_POSITION,
};
use crate::uart::{self, CommandEncoding, SerialConfig, SerialLink, MAX_FRAME_JOINTS};

/// Name the framework looks the plugin up by.
pub const PLUGIN_NAME: &str = "simple_arm_phoenix/ArmSystem";

pub struct ArmSystem {
    info: HardwareInfo,
    config: SerialConfig,
    joint_interfaces: JointInterfaceRegistry,

    // Reported positions and targets, one slot per joint
    states: Arc<SlotBank>,
    commands: Arc<SlotBank>,

    port: Option<Box<dyn Write + Send>>,
    lifecycle: LifecycleState,
}

impl Default for ArmSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmSystem {
    pub fn new() -> Self {
        Self {
            info: HardwareInfo::default(),
            config: SerialConfig::default(),
            joint_interfaces: JointInterfaceRegistry::new(),
            states: Arc::new(SlotBank::new(0)),
            commands: Arc::new(SlotBank::new(0)),
            port: None,
            lifecycle: LifecycleState::Unconfigured,
        }
    }

    /// Create and initialize in one step.
    pub fn from_info(info: HardwareInfo) -> Result<Self> {
        let mut system = Self::new();
        system.on_init(info)?;
        Ok(system)
    }

    pub fn info(&self) -> &HardwareInfo {
        &self.info
    }

    pub fn serial_config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn joint_count(&self) -> usize {
        self.commands.len()
    }

    /// Joint names bound to the position buffers, in buffer order.
    pub fn joint_names(&self) -> &[String] {
        self.joint_interfaces.joints(HW_IF_POSITION)
    }

    pub fn states(&self) -> Vec<f64> {
        self.states.snapshot()
    }

    pub fn commands(&self) -> Vec<f64> {
        self.commands.snapshot()
    }

    pub fn state(&self, index: usize) -> Option<f64> {
        self.states.get(index)
    }

    pub fn set_command(&self, index: usize, value: f64) -> bool {
        self.commands.set(index, value)
    }

    pub fn is_port_open(&self) -> bool {
        self.port.is_some()
    }

    fn release_port(&mut self) {
        if self.port.take().is_some() {
            info!(device = %self.config.device, "serial link released");
        }
    }

    #[cfg(test)]
    fn attach_port(&mut self, port: Box<dyn Write + Send>) {
        self.port = Some(port);
        self.lifecycle = LifecycleState::Active;
    }
}

impl std::fmt::Debug for ArmSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmSystem")
            .field("lifecycle", &self.lifecycle)
            .field("device", &self.config.device)
            .field("joints", &self.joint_names())
            .field("port_open", &self.is_port_open())
            .finish()
    }
}

impl SystemInterface for ArmSystem {
    fn on_init(&mut self, info: HardwareInfo) -> Result<()> {
        if self.lifecycle != LifecycleState::Unconfigured {
            return Err(ArmError::InvalidTransition { action: "initialize", state: self.lifecycle });
        }

        hardware::validate_info(&info)?;
        let config = SerialConfig::from_parameters(&info.parameters)?;

        let joints = info.joints.len();
        let joint_interfaces = JointInterfaceRegistry::from_state_interfaces(&info.joints);

        let registered = joint_interfaces.joints(HW_IF_POSITION).len();
        if registered > joints {
            return Err(ArmError::RegistryOverflow {
                kind: HW_IF_POSITION.to_string(),
                registered,
                joints,
            });
        }
        if config.encoding == CommandEncoding::Frame && joints > MAX_FRAME_JOINTS {
            return Err(ArmError::TooManyJoints { joints, max: MAX_FRAME_JOINTS });
        }

        self.states = Arc::new(SlotBank::new(joints));
        self.commands = Arc::new(SlotBank::new(joints));
        self.joint_interfaces = joint_interfaces;
        self.config = config;
        self.info = info;
        self.lifecycle = LifecycleState::Inactive;

        info!(
            system = %self.info.name,
            joints,
            device = %self.config.device,
            encoding = ?self.config.encoding,
            "arm hardware initialized"
        );
        Ok(())
    }

    fn on_activate(&mut self, previous: LifecycleState) -> Result<()> {
        if self.lifecycle != LifecycleState::Inactive {
            return Err(ArmError::InvalidTransition { action: "activate", state: self.lifecycle });
        }

        info!(?previous, device = %self.config.device, "activating arm hardware");
        let link = SerialLink::open(&self.config).map_err(|e| {
            warn!(error = %e, "activation failed");
            e
        })?;

        self.port = Some(Box::new(link));
        self.lifecycle = LifecycleState::Active;
        Ok(())
    }

    fn on_deactivate(&mut self, previous: LifecycleState) -> Result<()> {
        if self.lifecycle != LifecycleState::Active {
            return Err(ArmError::InvalidTransition { action: "deactivate", state: self.lifecycle });
        }

        info!(?previous, "deactivating arm hardware");
        self.release_port();
        self.lifecycle = LifecycleState::Inactive;
        Ok(())
    }

    fn on_shutdown(&mut self, previous: LifecycleState) -> Result<()> {
        if self.lifecycle == LifecycleState::Finalized {
            return Err(ArmError::InvalidTransition { action: "shut down", state: self.lifecycle });
        }

        info!(?previous, "shutting down arm hardware");
        self.release_port();
        self.lifecycle = LifecycleState::Finalized;
        Ok(())
    }

    fn export_state_interfaces(&self) -> Vec<StateInterface> {
        self.joint_names()
            .iter()
            .enumerate()
            .map(|(i, name)| StateInterface::new(name, HW_IF_POSITION, Arc::clone(&self.states), i))
            .collect()
    }

    fn export_command_interfaces(&self) -> Vec<CommandInterface> {
        self.joint_names()
            .iter()
            .enumerate()
            .map(|(i, name)| CommandInterface::new(name, HW_IF_POSITION, Arc::clone(&self.commands), i))
            .collect()
    }

    fn read(&mut self, _time: Duration, _period: Duration) -> Result<()> {
        if self.lifecycle == LifecycleState::Unconfigured {
            return Err(ArmError::NotInitialized);
        }

        // For now, joint position = joint command
        self.states.copy_from(&self.commands);
        Ok(())
    }

    fn write(&mut self, _time: Duration, period: Duration) -> Result<()> {
        if self.lifecycle != LifecycleState::Active {
            return Err(ArmError::NotActive);
        }
        let port = self.port.as_mut().ok_or(ArmError::NotActive)?;

        let bytes = self.config.encoding.encode(&self.commands.snapshot());
        debug!(bytes = bytes.len(), period_us = period.as_micros() as u64, "sending joint commands");

        uart::transmit(&mut **port, &bytes, self.config.write_retries).map_err(|e| {
            warn!(error = %e, "write cycle failed");
            e
        })
    }

    fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{InterfaceInfo, JointInfo};
    use std::io;
    use std::os::fd::AsRawFd;

    const PERIOD: Duration = Duration::from_millis(20);

    fn arm_info(joint_count: usize) -> HardwareInfo {
        HardwareInfo {
            name: "ArmSystem".to_string(),
            plugin: PLUGIN_NAME.to_string(),
            joints: (1..=joint_count).map(|i| JointInfo::position(&format!("j{}", i))).collect(),
            ..Default::default()
        }
        .with_parameter("settle_ms", "0")
    }

    #[test]
    fn test_init_sizes_zeroed_buffers() {
        for n in 0..=8 {
            let arm = ArmSystem::from_info(arm_info(n)).unwrap();
            assert_eq!(arm.joint_count(), n);
            assert_eq!(arm.states(), vec![0.0; n]);
            assert_eq!(arm.commands(), vec![0.0; n]);
            assert_eq!(arm.lifecycle_state(), LifecycleState::Inactive);
        }
    }

    #[test]
    fn test_export_six_joints_in_order() {
        let arm = ArmSystem::from_info(arm_info(6)).unwrap();
        let states = arm.export_state_interfaces();
        let commands = arm.export_command_interfaces();

        let expected = ["j1", "j2", "j3", "j4", "j5", "j6"];
        assert_eq!(states.len(), 6);
        assert_eq!(commands.len(), 6);
        for (i, name) in expected.iter().enumerate() {
            assert_eq!(states[i].joint_name(), *name);
            assert_eq!(commands[i].joint_name(), *name);
            assert_eq!(states[i].interface_name(), "position");
            assert_eq!(states[i].index(), i);
            assert_eq!(commands[i].index(), i);
        }
        assert_eq!(arm.joint_names(), &expected);
    }

    #[test]
    fn test_read_copies_commands_to_states() {
        let mut arm = ArmSystem::from_info(arm_info(6)).unwrap();
        let commands = arm.export_command_interfaces();
        let states = arm.export_state_interfaces();

        let targets = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        for (cmd, value) in commands.iter().zip(targets) {
            assert!(cmd.set_value(value));
        }
        assert_eq!(arm.states(), vec![0.0; 6]);

        arm.read(Duration::ZERO, PERIOD).unwrap();

        assert_eq!(arm.states(), targets.to_vec());
        for (state, value) in states.iter().zip(targets) {
            assert_eq!(state.get_value(), value);
        }
    }

    #[test]
    fn test_read_before_init() {
        let mut arm = ArmSystem::new();
        assert!(matches!(arm.read(Duration::ZERO, PERIOD), Err(ArmError::NotInitialized)));
    }

    #[test]
    fn test_base_init_failure_propagates() {
        let mut info = arm_info(2);
        info.name.clear();

        let mut arm = ArmSystem::new();
        assert!(matches!(arm.on_init(info), Err(ArmError::BaseInit(_))));
        assert_eq!(arm.lifecycle_state(), LifecycleState::Unconfigured);
    }

    #[test]
    fn test_bad_parameter_fails_init() {
        let info = arm_info(2).with_parameter("baud_rate", "300");
        assert!(matches!(ArmSystem::from_info(info), Err(ArmError::InvalidParameter { .. })));
    }

    #[test]
    fn test_init_twice_rejected() {
        let mut arm = ArmSystem::from_info(arm_info(1)).unwrap();
        let err = arm.on_init(arm_info(1)).unwrap_err();
        assert!(matches!(err, ArmError::InvalidTransition { action: "initialize", .. }));
    }

    #[test]
    fn test_registry_must_fit_buffers() {
        let mut info = arm_info(2);
        info.joints[0].state_interfaces.push(InterfaceInfo { name: "position".to_string() });
        info.joints[1].state_interfaces.push(InterfaceInfo { name: "position".to_string() });

        let err = ArmSystem::from_info(info).unwrap_err();
        assert!(matches!(err, ArmError::RegistryOverflow { registered: 4, joints: 2, .. }));
    }

    #[test]
    fn test_joint_without_position_state() {
        let mut info = arm_info(3);
        info.joints[1].state_interfaces.clear();

        let arm = ArmSystem::from_info(info).unwrap();
        assert_eq!(arm.joint_count(), 3);
        assert_eq!(arm.joint_names(), &["j1", "j3"]);
        assert_eq!(arm.export_state_interfaces().len(), 2);
        assert_eq!(arm.export_command_interfaces().len(), 2);
    }

    #[test]
    fn test_frame_joint_limit() {
        let err = ArmSystem::from_info(arm_info(MAX_FRAME_JOINTS + 1)).unwrap_err();
        assert!(matches!(err, ArmError::TooManyJoints { .. }));

        let info = arm_info(MAX_FRAME_JOINTS + 1).with_parameter("command_encoding", "placeholder");
        assert!(ArmSystem::from_info(info).is_ok());
    }

    #[test]
    fn test_write_requires_active() {
        let mut arm = ArmSystem::from_info(arm_info(6)).unwrap();
        assert!(matches!(arm.write(Duration::ZERO, PERIOD), Err(ArmError::NotActive)));
    }

    #[test]
    fn test_transitions_out_of_order() {
        let mut arm = ArmSystem::from_info(arm_info(1)).unwrap();
        let err = arm.on_deactivate(LifecycleState::Inactive).unwrap_err();
        assert!(matches!(err, ArmError::InvalidTransition { action: "deactivate", .. }));

        arm.on_shutdown(LifecycleState::Inactive).unwrap();
        assert_eq!(arm.lifecycle_state(), LifecycleState::Finalized);
        assert!(arm.on_activate(LifecycleState::Finalized).is_err());
        assert!(arm.on_shutdown(LifecycleState::Finalized).is_err());
    }

    #[test]
    fn test_activate_missing_device_stays_inactive() {
        let info = arm_info(6).with_parameter("device", "/dev/does-not-exist-arm");
        let mut arm = ArmSystem::from_info(info).unwrap();

        let err = arm.on_activate(LifecycleState::Inactive).unwrap_err();
        assert!(matches!(err, ArmError::Open { .. }));
        assert_eq!(arm.lifecycle_state(), LifecycleState::Inactive);
        assert!(!arm.is_port_open());
    }

    #[test]
    fn test_activate_non_tty_releases_device() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let mut arm = ArmSystem::from_info(arm_info(2).with_parameter("device", &path)).unwrap();

        let err = arm.on_activate(LifecycleState::Inactive).unwrap_err();
        assert!(matches!(err, ArmError::Termios { .. }));
        assert_eq!(arm.lifecycle_state(), LifecycleState::Inactive);
        assert!(!arm.is_port_open());

        // The failed activation must not keep the lock
        let other = std::fs::File::open(&path).unwrap();
        let locked = unsafe { libc::flock(other.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(locked, 0);
    }

    #[test]
    fn test_debug_output() {
        let arm = ArmSystem::from_info(arm_info(2)).unwrap();
        let text = format!("{:?}", arm);
        assert!(text.contains("Inactive"));
        assert!(text.contains("j2"));
        assert!(text.contains("port_open: false"));
    }

    struct BrokenPort;

    impl Write for BrokenPort {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        let mut arm = ArmSystem::from_info(arm_info(6)).unwrap();
        arm.attach_port(Box::new(BrokenPort));

        let err = arm.write(Duration::ZERO, PERIOD).unwrap_err();
        assert!(matches!(err, ArmError::Write(_)));

        // The next cycle runs normally
        arm.read(Duration::ZERO, PERIOD).unwrap();
        assert_eq!(arm.lifecycle_state(), LifecycleState::Active);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let mut system: Box<dyn SystemInterface> = Box::new(ArmSystem::new());
        system.on_init(arm_info(2)).unwrap();
        assert_eq!(system.export_command_interfaces().len(), 2);
        assert_eq!(system.lifecycle_state(), LifecycleState::Inactive);
    }

    #[cfg(target_os = "linux")]
    mod on_pty {
        use super::*;
        use crate::uart::{decode_joint_frame, pty, MSG_JOINT_COMMAND, SYNC_BYTE};
        use std::io::Read;

        fn active_arm(pty: &pty::Pty, encoding: &str) -> ArmSystem {
            let info = arm_info(6)
                .with_parameter("device", &pty.slave_path)
                .with_parameter("command_encoding", encoding);
            let mut arm = ArmSystem::from_info(info).unwrap();
            arm.on_activate(LifecycleState::Inactive).unwrap();
            arm
        }

        fn assert_drained(master: &mut std::fs::File) {
            unsafe {
                let fd = master.as_raw_fd();
                let flags = libc::fcntl(fd, libc::F_GETFL);
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }
            let mut extra = [0u8; 16];
            let err = master.read(&mut extra).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        }

        #[test]
        fn test_activate_opens_device() {
            let pty = pty::open();
            let arm = active_arm(&pty, "frame");
            assert_eq!(arm.lifecycle_state(), LifecycleState::Active);
            assert!(arm.is_port_open());
        }

        #[test]
        fn test_placeholder_write_sends_four_bytes() {
            let mut pty = pty::open();
            let mut arm = active_arm(&pty, "placeholder");
            arm.set_command(0, 1.5);

            arm.write(Duration::ZERO, PERIOD).unwrap();

            let mut buf = [0u8; 4];
            pty.master.read_exact(&mut buf).unwrap();
            assert_eq!(f32::from_ne_bytes(buf), 4.05);
            assert_drained(&mut pty.master);
        }

        #[test]
        fn test_frame_write_sends_commands() {
            let mut pty = pty::open();
            let mut arm = active_arm(&pty, "frame");
            for (i, value) in [0.1, 0.2, 0.3, 0.4, 0.5, 0.6].into_iter().enumerate() {
                arm.set_command(i, value);
            }

            arm.read(Duration::ZERO, PERIOD).unwrap();
            arm.write(Duration::ZERO, PERIOD).unwrap();

            let mut frame = vec![0u8; 4 + 6 * 4];
            pty.master.read_exact(&mut frame).unwrap();
            assert_eq!(frame[0], SYNC_BYTE);
            assert_eq!(frame[1], MSG_JOINT_COMMAND);
            assert_eq!(frame[2], 24);

            let decoded = decode_joint_frame(&frame).unwrap();
            assert_eq!(decoded, vec![0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6]);
            assert_drained(&mut pty.master);
        }

        #[test]
        fn test_activation_fails_when_locked() {
            let pty = pty::open();
            let config = SerialConfig {
                device: pty.slave_path.clone(),
                settle: Duration::ZERO,
                ..Default::default()
            };
            let holder = SerialLink::open(&config).unwrap();

            let info = arm_info(6).with_parameter("device", &pty.slave_path);
            let mut arm = ArmSystem::from_info(info).unwrap();
            let err = arm.on_activate(LifecycleState::Inactive).unwrap_err();

            assert!(matches!(err, ArmError::DeviceLocked { .. }));
            assert_eq!(arm.lifecycle_state(), LifecycleState::Inactive);
            assert!(!arm.is_port_open());

            drop(holder);
            arm.on_activate(LifecycleState::Inactive).unwrap();
        }

        #[test]
        fn test_deactivate_releases_device() {
            let pty = pty::open();
            let mut arm = active_arm(&pty, "frame");
            let config = arm.serial_config().clone();

            assert!(matches!(SerialLink::open(&config), Err(ArmError::DeviceLocked { .. })));

            arm.on_deactivate(LifecycleState::Active).unwrap();
            assert!(!arm.is_port_open());
            assert!(matches!(arm.write(Duration::ZERO, PERIOD), Err(ArmError::NotActive)));
            assert!(SerialLink::open(&config).is_ok());

            // Reactivation after release
            arm.on_activate(LifecycleState::Inactive).unwrap();
            assert_eq!(arm.lifecycle_state(), LifecycleState::Active);
        }

        #[test]
        fn test_activate_twice_rejected() {
            let pty = pty::open();
            let mut arm = active_arm(&pty, "frame");
            let err = arm.on_activate(LifecycleState::Active).unwrap_err();
            assert!(matches!(err, ArmError::InvalidTransition { action: "activate", .. }));
            assert!(arm.is_port_open());
        }

        #[test]
        fn test_drop_releases_device() {
            let pty = pty::open();
            let arm = active_arm(&pty, "frame");
            let config = arm.serial_config().clone();
            drop(arm);
            assert!(SerialLink::open(&config).is_ok());
        }
    }
}
