/**
 * Arm Hardware Adapter
 *
 * Hardware-system plugin for the six-joint arm:
 * - position state/command buffers bound to framework handles
 * - serial link to the arm controller, held only while active
 * - one command transmission per control cycle
 */

pub mod system;

pub use system::{ArmSystem, PLUGIN_NAME};
