use std::time::Duration;
use url::Url;

/// A device seen by one of the per-interface locators.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DiscoveredDevice {
    /// Unique service name of the device instance.
    pub usn: String,

    /// Notification type the device was announced with.
    pub notification_type: String,

    /// Where the description document of the device can be fetched.
    ///
    /// The same device discovered on several interfaces shows up under several locations,
    /// so this (and not the usn) is what tracked devices are keyed by.
    pub description_location: Url,

    /// How long the advertisement stays valid.
    pub cache_lifetime: Duration,

    /// Raw headers of the advertisement the device was discovered through.
    pub headers: Vec<(String, String)>,
}

impl DiscoveredDevice {
    pub fn new(
        usn: impl Into<String>,
        notification_type: impl Into<String>,
        description_location: Url,
    ) -> Self {
        Self {
            usn: usn.into(),
            notification_type: notification_type.into(),
            description_location,
            cache_lifetime: Duration::ZERO,
            headers: Vec::new(),
        }
    }
}

/// A device published by this host.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RootDevice {
    pub uuid: String,

    /// Advertised location, filled in per interface when the device is published.
    pub location: Option<Url>,
    pub cache_lifetime: Duration,
    pub device_type_namespace: String,
    pub device_type: String,
    pub device_version: u32,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
}

impl RootDevice {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            location: None,
            cache_lifetime: Duration::from_secs(1800),
            device_type_namespace: "schemas-upnp-org".to_string(),
            device_type: "Basic".to_string(),
            device_version: 1,
            friendly_name: String::new(),
            manufacturer: String::new(),
            model_name: String::new(),
        }
    }

    /// Returns a copy of the device advertised under `location`.
    pub fn with_location(&self, location: Url) -> Self {
        Self {
            location: Some(location),
            ..self.clone()
        }
    }

    /// Full device type urn, e.g. `urn:schemas-upnp-org:device:Basic:1`.
    pub fn full_device_type(&self) -> String {
        format!(
            "urn:{}:device:{}:{}",
            self.device_type_namespace, self.device_type, self.device_version
        )
    }

    /// Renders the UPnP description document of the device.
    ///
    /// The document does not contain the advertised location, so all interface specific
    /// copies of a device share the same document.
    pub fn to_description_document(&self) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("<?xml version=\"1.0\"?>\r\n");
        out.push_str("<root xmlns=\"urn:schemas-upnp-org:device-1-0\">");
        out.push_str("<specVersion><major>1</major><minor>0</minor></specVersion>");
        out.push_str("<device>");
        push_element(&mut out, "deviceType", &self.full_device_type());
        push_element(&mut out, "friendlyName", &self.friendly_name);
        push_element(&mut out, "manufacturer", &self.manufacturer);
        push_element(&mut out, "modelName", &self.model_name);
        push_element(&mut out, "UDN", &format!("uuid:{}", self.uuid));
        out.push_str("</device>");
        out.push_str("</root>");
        out
    }
}

fn push_element(out: &mut String, name: &str, value: &str) {
    if value.is_empty() {
        return;
    }

    out.push('<');
    out.push_str(name);
    out.push('>');
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> RootDevice {
        RootDevice {
            device_type_namespace: "test-namespace".to_string(),
            device_type: "test-device-type".to_string(),
            friendly_name: "Kitchen & Hall".to_string(),
            manufacturer: "manufacturer".to_string(),
            model_name: "<model>".to_string(),
            ..RootDevice::new("1f0c5d1e-2b9a-4c39-8f0e-6a0c4f7b9d11")
        }
    }

    #[test]
    fn document_contains_escaped_metadata() {
        let document = device().to_description_document();

        assert!(document.contains("<deviceType>urn:test-namespace:device:test-device-type:1</deviceType>"));
        assert!(document.contains("<friendlyName>Kitchen &amp; Hall</friendlyName>"));
        assert!(document.contains("<modelName>&lt;model&gt;</modelName>"));
        assert!(document.contains("<UDN>uuid:1f0c5d1e-2b9a-4c39-8f0e-6a0c4f7b9d11</UDN>"));
    }

    #[test]
    fn document_does_not_depend_on_location() {
        let device = device();
        let located = device.with_location(
            Url::parse("http://10.0.0.1:3333/upnp/description/1f0c5d1e").unwrap(),
        );

        assert_eq!(located.uuid, device.uuid);
        assert_eq!(located.cache_lifetime, device.cache_lifetime);
        assert_eq!(
            located.to_description_document(),
            device.to_description_document()
        );
    }
}
