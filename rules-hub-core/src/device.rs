//! Device catalog snapshot models

use serde::{Deserialize, Serialize};

/// A device as reported by a controller
///
/// Snapshots are immutable: a catalog refresh replaces the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Controller-local device id
    pub id: String,
    /// Controller-qualified id (`<controller>-<id>`)
    pub altuiid: String,
    pub name: String,
    pub room_id: String,
    /// Device type URN
    pub device_type: String,
    pub category_num: Option<u32>,
    pub subcategory_num: Option<u32>,
    pub controller_id: String,
    #[serde(default)]
    pub states: Vec<DeviceState>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            altuiid: format!("0-{}", id),
            id,
            name: name.into(),
            room_id: String::new(),
            device_type: String::new(),
            category_num: None,
            subcategory_num: None,
            controller_id: "0".to_string(),
            states: Vec::new(),
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = room_id.into();
        self
    }

    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_category(mut self, category: u32, subcategory: Option<u32>) -> Self {
        self.category_num = Some(category);
        self.subcategory_num = subcategory;
        self
    }

    pub fn with_controller(mut self, controller_id: impl Into<String>) -> Self {
        self.controller_id = controller_id.into();
        self.altuiid = format!("{}-{}", self.controller_id, self.id);
        self
    }

    pub fn with_state(
        mut self,
        service: impl Into<String>,
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.states.push(DeviceState {
            service: service.into(),
            variable: variable.into(),
            value: value.into(),
        });
        self
    }
}

/// One `(service, variable) = value` entry of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub service: String,
    pub variable: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Actions a device exposes for one UPnP service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceActions {
    pub service_id: String,
    pub actions: Vec<ActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    /// Names of the action's input arguments
    #[serde(default)]
    pub input: Vec<String>,
}
