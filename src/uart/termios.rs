use std::io;
use std::os::fd::RawFd;

use crate::error::{ArmError, Result};
use super::SerialConfig;

pub fn baud_to_speed(baud: u32) -> Option<libc::speed_t>{
    match baud{
        9600 => Some(libc::B9600),
        19200 => Some(libc::B19200),
        38400 => Some(libc::B38400),
        57600 => Some(libc::B57600),
        115200 => Some(libc::B115200),
        230400 => Some(libc::B230400),
        _ => None,
    }
}

pub fn get_attributes(fd: RawFd) -> Result<libc::termios>{
    let mut tty: libc::termios = unsafe{ std::mem::zeroed() };
    if unsafe{ libc::tcgetattr(fd, &mut tty) } != 0{
        return Err(ArmError::Termios{ step: "tcgetattr", source: io::Error::last_os_error() });
    }
    Ok(tty)
}

//8N1, raw, no flow control
pub fn raw_line_settings(tty: &mut libc::termios, config: &SerialConfig, speed: libc::speed_t) -> Result<()>{
    tty.c_cflag &= !libc::PARENB;
    tty.c_cflag &= !libc::CSTOPB;
    tty.c_cflag &= !libc::CSIZE;
    tty.c_cflag |= libc::CS8;
    tty.c_cflag &= !libc::CRTSCTS;
    tty.c_cflag |= libc::CREAD | libc::CLOCAL;

    tty.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ECHONL | libc::ISIG);

    tty.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    tty.c_iflag &= !(libc::IGNBRK | libc::BRKINT | libc::PARMRK | libc::ISTRIP
        | libc::INLCR | libc::IGNCR | libc::ICRNL);

    tty.c_oflag &= !(libc::OPOST | libc::ONLCR);

    tty.c_cc[libc::VTIME] = config.read_timeout_ds;
    tty.c_cc[libc::VMIN] = config.min_read_bytes;

    unsafe{
        if libc::cfsetispeed(tty, speed) != 0{
            return Err(ArmError::Termios{ step: "cfsetispeed", source: io::Error::last_os_error() });
        }
        if libc::cfsetospeed(tty, speed) != 0{
            return Err(ArmError::Termios{ step: "cfsetospeed", source: io::Error::last_os_error() });
        }
    }
    Ok(())
}

/// Apply the line settings in `config` to `fd` and confirm the driver kept them.
pub fn configure(fd: RawFd, config: &SerialConfig) -> Result<libc::termios>{
    let speed = baud_to_speed(config.baud_rate).ok_or_else(|| ArmError::invalid_parameter(
        "baud_rate",
        format!("unsupported rate {}", config.baud_rate),
    ))?;

    let mut tty = get_attributes(fd)?;
    raw_line_settings(&mut tty, config, speed)?;

    if unsafe{ libc::tcsetattr(fd, libc::TCSANOW, &tty) } != 0{
        return Err(ArmError::Termios{ step: "tcsetattr", source: io::Error::last_os_error() });
    }

    //tcsetattr reports success if any change took, so read back
    let applied = get_attributes(fd)?;
    verify(&applied, &tty)?;
    Ok(applied)
}

const CFLAG_MASK: libc::tcflag_t = libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS
    | libc::CREAD | libc::CLOCAL;
const LFLAG_MASK: libc::tcflag_t = libc::ICANON | libc::ECHO | libc::ECHOE | libc::ECHONL | libc::ISIG;
const IFLAG_MASK: libc::tcflag_t = libc::IXON | libc::IXOFF | libc::IXANY | libc::IGNBRK | libc::BRKINT
    | libc::PARMRK | libc::ISTRIP | libc::INLCR | libc::IGNCR | libc::ICRNL;
const OFLAG_MASK: libc::tcflag_t = libc::OPOST | libc::ONLCR;

//every bit raw_line_settings touches must read back as requested
fn verify(tty: &libc::termios, requested: &libc::termios) -> Result<()>{
    let mismatch = |what: &str| ArmError::Termios{
        step: "verify",
        source: io::Error::new(io::ErrorKind::Other, format!("{} not applied", what)),
    };

    if tty.c_cflag & CFLAG_MASK != requested.c_cflag & CFLAG_MASK{
        return Err(mismatch("8N1 framing and control flags"));
    }
    if tty.c_lflag & LFLAG_MASK != requested.c_lflag & LFLAG_MASK{
        return Err(mismatch("raw mode"));
    }
    if tty.c_iflag & IFLAG_MASK != requested.c_iflag & IFLAG_MASK{
        return Err(mismatch("input processing off"));
    }
    if tty.c_oflag & OFLAG_MASK != requested.c_oflag & OFLAG_MASK{
        return Err(mismatch("output processing off"));
    }
    if tty.c_cc[libc::VTIME] != requested.c_cc[libc::VTIME] || tty.c_cc[libc::VMIN] != requested.c_cc[libc::VMIN]{
        return Err(mismatch("read timeout"));
    }
    unsafe{
        if libc::cfgetospeed(tty) != libc::cfgetospeed(requested){
            return Err(mismatch("output baud rate"));
        }
        if libc::cfgetispeed(tty) != libc::cfgetispeed(requested){
            return Err(mismatch("input baud rate"));
        }
    }
    Ok(())
}

//speed as the C library reports it back after cfsetospeed
#[cfg(test)]
pub(crate) fn speed_of(speed: libc::speed_t) -> libc::speed_t{
    let mut tty: libc::termios = unsafe{ std::mem::zeroed() };
    unsafe{
        libc::cfsetospeed(&mut tty, speed);
        libc::cfgetospeed(&tty)
    }
}
