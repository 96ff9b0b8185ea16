use std::collections::HashMap;

use super::JointInfo;

//interface kind -> joint names, in registration order
#[derive(Debug, Clone, Default)]
pub struct JointInterfaceRegistry{
    by_kind: HashMap<String, Vec<String>>,
}

impl JointInterfaceRegistry{
    pub fn new() -> Self{
        JointInterfaceRegistry{
            by_kind: HashMap::new(),
        }
    }

    //scan the declared state interfaces of every joint, in order
    pub fn from_state_interfaces(joints: &[JointInfo]) -> Self{
        let mut registry = Self::new();
        for joint in joints{
            for iface in &joint.state_interfaces{
                registry.register(&iface.name, &joint.name);
            }
        }
        registry
    }

    pub fn register(&mut self, kind: &str, joint_name: &str){
        self.by_kind
            .entry(kind.to_string())
            .or_default()
            .push(joint_name.to_string());
    }

    pub fn joints(&self, kind: &str) -> &[String]{
        self.by_kind.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kind_count(&self) -> usize{
        self.by_kind.len()
    }
}
