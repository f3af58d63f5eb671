use serde_json::{Map, Value};

/// Supplies the device attributes that are encrypted into `sdkEncData`.
///
/// The map is opaque to the SDK. An empty map means no device data is sent.
pub trait DeviceInformationProvider: Send + Sync {
    fn device_information(&self) -> Map<String, Value>;
}

/// A fixed set of attributes collected up front.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceInformation {
    attributes: Map<String, Value>,
}

impl StaticDeviceInformation {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Build from a JSON object. Non-objects yield an empty set.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(attributes) => Self { attributes },
            _ => Self::default(),
        }
    }
}

impl DeviceInformationProvider for StaticDeviceInformation {
    fn device_information(&self) -> Map<String, Value> {
        self.attributes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_returns_attributes() {
        let provider = StaticDeviceInformation::from_json(serde_json::json!({"DV": "1.0"}));
        assert_eq!(provider.device_information()["DV"], "1.0");
        assert!(StaticDeviceInformation::from_json(Value::Null)
            .device_information()
            .is_empty());
    }
}
