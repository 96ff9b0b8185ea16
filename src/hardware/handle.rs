use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

//fixed-length bank of f64 slots, stored as bit patterns so handles can be shared
pub struct SlotBank{
    slots: Vec<AtomicU64>,
}

impl SlotBank{
    //zero-filled bank of `len` slots
    pub fn new(len: usize) -> Self{
        let slots = (0..len).map(|_| AtomicU64::new(0.0f64.to_bits())).collect();
        SlotBank{ slots }
    }

    pub fn len(&self) -> usize{
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool{
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64>{
        self.slots.get(index).map(|s| f64::from_bits(s.load(Ordering::Acquire)))
    }

    //returns false when index is out of range
    pub fn set(&self, index: usize, value: f64) -> bool{
        match self.slots.get(index){
            Some(slot) =>{
                slot.store(value.to_bits(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<f64>{
        self.slots.iter().map(|s| f64::from_bits(s.load(Ordering::Acquire))).collect()
    }

    //copy every slot of `other` into self, up to the shorter length
    pub fn copy_from(&self, other: &SlotBank){
        for (dst, src) in self.slots.iter().zip(other.slots.iter()){
            dst.store(src.load(Ordering::Acquire), Ordering::Release);
        }
    }
}

impl std::fmt::Debug for SlotBank{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result{
        f.debug_list().entries(self.snapshot()).finish()
    }
}

/// Read-only view of one state slot.
#[derive(Clone, Debug)]
pub struct StateInterface{
    joint_name: String,
    interface_name: String,
    bank: Arc<SlotBank>,
    index: usize,
}

impl StateInterface{
    pub fn new(joint_name: &str, interface_name: &str, bank: Arc<SlotBank>, index: usize) -> Self{
        StateInterface{
            joint_name: joint_name.to_string(),
            interface_name: interface_name.to_string(),
            bank,
            index,
        }
    }

    pub fn joint_name(&self) -> &str{
        &self.joint_name
    }

    pub fn interface_name(&self) -> &str{
        &self.interface_name
    }

    /// `"<joint>/<interface>"`, the key the framework uses for lookups.
    pub fn full_name(&self) -> String{
        format!("{}/{}", self.joint_name, self.interface_name)
    }

    pub fn index(&self) -> usize{
        self.index
    }

    pub fn get_value(&self) -> f64{
        self.bank.get(self.index).unwrap_or(f64::NAN)
    }
}

/// Read/write view of one command slot.
#[derive(Clone, Debug)]
pub struct CommandInterface{
    joint_name: String,
    interface_name: String,
    bank: Arc<SlotBank>,
    index: usize,
}

impl CommandInterface{
    pub fn new(joint_name: &str, interface_name: &str, bank: Arc<SlotBank>, index: usize) -> Self{
        CommandInterface{
            joint_name: joint_name.to_string(),
            interface_name: interface_name.to_string(),
            bank,
            index,
        }
    }

    pub fn joint_name(&self) -> &str{
        &self.joint_name
    }

    pub fn interface_name(&self) -> &str{
        &self.interface_name
    }

    pub fn full_name(&self) -> String{
        format!("{}/{}", self.joint_name, self.interface_name)
    }

    pub fn index(&self) -> usize{
        self.index
    }

    pub fn get_value(&self) -> f64{
        self.bank.get(self.index).unwrap_or(f64::NAN)
    }

    pub fn set_value(&self, value: f64) -> bool{
        self.bank.set(self.index, value)
    }
}
