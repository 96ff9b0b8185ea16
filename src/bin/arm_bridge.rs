/**
 * Arm Bridge Binary
 *
 * Drives the arm hardware adapter without a control framework:
 * 1. Loads the robot description (TOML)
 * 2. Initializes and activates the adapter
 * 3. Runs read -> write at a fixed rate
 * 4. Accepts joint commands on stdin
 *
 * Usage: arm_bridge <description.toml> [rate_hz]
 *        arm_bridge --list-ports
 */

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use simple_arm_phoenix::uart;
use simple_arm_phoenix::{
    ArmSystem, CommandInterface, HardwareInfo, LifecycleState, StateInterface, SystemInterface,
};
use tracing::{debug, error, info, warn};

const DEFAULT_RATE_HZ: f64 = 50.0;

fn init_logging() {
    // RUST_LOG selects the level (default "info"); ARM_LOG_FORMAT=json for JSON lines
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("ARM_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }
}

fn list_ports() {
    match uart::list_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports found"),
        Ok(ports) => {
            for port in ports {
                println!("  {}", port);
            }
        }
        Err(e) => error!(error = %e, "could not list serial ports"),
    }
}

fn cycle_period(rate_hz: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / rate_hz).unwrap_or_else(|_| {
        warn!(rate_hz, "rate out of range, using {} Hz", DEFAULT_RATE_HZ);
        Duration::from_secs_f64(1.0 / DEFAULT_RATE_HZ)
    })
}

fn control_loop(mut arm: ArmSystem, running: Arc<AtomicBool>, period: Duration) {
    let start = Instant::now();
    let mut last = start;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        if let Err(e) = arm.read(now - start, elapsed) {
            warn!(error = %e, "read cycle failed");
        }
        // the adapter warns on write failures; keep cycling
        if let Err(e) = arm.write(now - start, elapsed) {
            debug!(error = %e, "write cycle skipped");
        }

        let spent = now.elapsed();
        if spent < period {
            thread::sleep(period - spent);
        }
    }

    if arm.lifecycle_state() == LifecycleState::Active {
        if let Err(e) = arm.on_deactivate(LifecycleState::Active) {
            warn!(error = %e, "deactivation failed");
        }
    }
    if let Err(e) = arm.on_shutdown(arm.lifecycle_state()) {
        warn!(error = %e, "shutdown failed");
    }
    info!("control loop stopped");
}

fn show(commands: &[CommandInterface], states: &[StateInterface]) {
    for (cmd, state) in commands.iter().zip(states) {
        println!(
            "  {:<12} command={:>9.4} state={:>9.4}",
            cmd.joint_name(),
            cmd.get_value(),
            state.get_value()
        );
    }
}

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).map(String::as_str) == Some("--list-ports") {
        list_ports();
        return;
    }

    let Some(path) = args.get(1) else {
        eprintln!("Usage: arm_bridge <description.toml> [rate_hz]");
        eprintln!("       arm_bridge --list-ports");
        std::process::exit(2);
    };
    let rate_hz = args
        .get(2)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|r| *r > 0.0 && r.is_finite())
        .unwrap_or(DEFAULT_RATE_HZ);
    let period = cycle_period(rate_hz);

    let mut arm = match HardwareInfo::from_file(path).and_then(ArmSystem::from_info) {
        Ok(arm) => arm,
        Err(e) => {
            error!(error = %e, path = %path, "initialization failed");
            std::process::exit(1);
        }
    };

    let commands = arm.export_command_interfaces();
    let states = arm.export_state_interfaces();

    if let Err(e) = arm.on_activate(LifecycleState::Inactive) {
        error!(error = %e, "activation failed");
        std::process::exit(1);
    }

    println!("==============================================");
    println!("  Simple Arm Phoenix Bridge");
    println!("==============================================");
    println!("  Device: {}", arm.serial_config().device);
    println!("  Baud:   {}", arm.serial_config().baud_rate);
    println!("  Joints: {}", arm.joint_names().join(", "));
    println!("  Rate:   {} Hz", rate_hz);
    println!("==============================================\n");

    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let handle = thread::spawn(move || control_loop(arm, loop_running, period));

    println!("[Commands]");
    println!("  set <joint> <value> - command a joint position");
    println!("  zero - command every joint to 0");
    println!("  show - print commands and states");
    println!("  x - exit\n");

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let words: Vec<&str> = input.split_whitespace().collect();
        match words.as_slice() {
            ["set", joint, value] => {
                let Ok(value) = value.parse::<f64>() else {
                    println!("Not a number: {}", value);
                    continue;
                };
                match commands.iter().find(|c| c.joint_name() == *joint) {
                    Some(cmd) => {
                        cmd.set_value(value);
                        println!("[{} -> {}]", joint, value);
                    }
                    None => println!("Unknown joint: {}", joint),
                }
            }
            ["zero"] => {
                for cmd in &commands {
                    cmd.set_value(0.0);
                }
                println!("[ZERO]");
            }
            ["show"] | ["r"] => show(&commands, &states),
            ["x"] | ["exit"] | ["quit"] => {
                println!("[SHUTDOWN]");
                break;
            }
            [] => {}
            _ => println!("Unknown command: {}", input.trim()),
        }
    }

    running.store(false, Ordering::SeqCst);
    let _ = handle.join();
    println!("Goodbye!");
}
