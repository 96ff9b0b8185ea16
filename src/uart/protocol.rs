use std::str::FromStr;

pub const SYNC_BYTE: u8 = 0xAA;
pub const MAX_MSG_SIZE: usize = 244;

//frame type carrying one f32 position per joint
pub const MSG_JOINT_COMMAND: u8 = 0x20;
pub const JOINT_VALUE_SIZE: usize = 4;        //1 * f32
pub const MAX_FRAME_JOINTS: usize = MAX_MSG_SIZE / JOINT_VALUE_SIZE;

//constant the stub firmware expects on every cycle
pub const PLACEHOLDER_VALUE: f32 = 4.05;

/// How joint commands are put on the wire each write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandEncoding{
    /// `[SYNC][TYPE][LEN][f32 LE per joint][CHECKSUM]`
    #[default]
    Frame,
    /// The four native-endian bytes of `PLACEHOLDER_VALUE`, whatever the commands are.
    Placeholder,
}

impl FromStr for CommandEncoding{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>{
        match s.trim().to_ascii_lowercase().as_str(){
            "frame" => Ok(CommandEncoding::Frame),
            "placeholder" => Ok(CommandEncoding::Placeholder),
            other => Err(format!("unknown command encoding '{}'", other)),
        }
    }
}

impl CommandEncoding{
    pub fn encode(&self, commands: &[f64]) -> Vec<u8>{
        match self{
            CommandEncoding::Frame => encode_joint_frame(commands),
            CommandEncoding::Placeholder => PLACEHOLDER_VALUE.to_ne_bytes().to_vec(),
        }
    }
}

pub fn calculate_checksum(data: &[u8]) -> u8{
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

//frame format: [SYNC][TYPE][LEN][PAYLOAD...][CHECKSUM]
//              0xAA  1byte 1byte  LEN bytes   1byte
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Option<Vec<u8>>{
    if payload.len() > MAX_MSG_SIZE{
        return None;
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(SYNC_BYTE);
    frame.push(msg_type);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);

    let checksum = calculate_checksum(&frame[1..]);
    frame.push(checksum);
    Some(frame)
}

//commands beyond MAX_FRAME_JOINTS are dropped; initialization rejects such joint counts
pub fn encode_joint_frame(commands: &[f64]) -> Vec<u8>{
    let payload: Vec<u8> = commands
        .iter()
        .take(MAX_FRAME_JOINTS)
        .flat_map(|&c| (c as f32).to_le_bytes())
        .collect();

    encode_frame(MSG_JOINT_COMMAND, &payload).unwrap_or_default()
}

/// Parse one complete frame at the start of `data`, returning type and payload.
pub fn decode_frame(data: &[u8]) -> Option<(u8, &[u8])>{
    if data.len() < 4 || data[0] != SYNC_BYTE{
        return None;
    }

    let len = data[2] as usize;
    if len > MAX_MSG_SIZE || data.len() < 4 + len{
        return None;
    }

    let checksum = data[3 + len];
    if checksum != calculate_checksum(&data[1..3 + len]){
        return None;
    }

    Some((data[1], &data[3..3 + len]))
}

pub fn decode_joint_frame(data: &[u8]) -> Option<Vec<f32>>{
    let (msg_type, payload) = decode_frame(data)?;
    if msg_type != MSG_JOINT_COMMAND || payload.len() % JOINT_VALUE_SIZE != 0{
        return None;
    }

    Some(payload
        .chunks_exact(JOINT_VALUE_SIZE)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
