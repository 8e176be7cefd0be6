//! Service discovery.
//!
//! A device lists its services in the description document served at
//! [`DESCRIPTION_PATH`]. Each `<service>` block names a `serviceType` and the
//! `controlURL` that accepts SOAP actions for it:
//!
//! ```xml
//! <service>
//!   <serviceType>urn:dslforum-org:service:DeviceInfo:1</serviceType>
//!   <serviceId>urn:DeviceInfo-com:serviceId:DeviceInfo1</serviceId>
//!   <controlURL>/upnp/control/deviceinfo</controlURL>
//!   <eventSubURL>/upnp/control/deviceinfo</eventSubURL>
//!   <SCPDURL>/deviceinfoSCPD.xml</SCPDURL>
//! </service>
//! ```

use alloc::collections::BTreeMap;
use alloc::collections::btree_map;
use alloc::format;
use alloc::string::String;

use log::{debug, info, warn};

use crate::xml::{ByteSource, SliceSource, TagScanner, extract_single_streaming};

/// Namespace prefix of the standard TR-064 services.
pub const SERVICE_PREFIX: &str = "urn:dslforum-org:service:";

/// Upper bound on the number of services read from one description document.
pub const MAX_SERVICES: usize = 200;

/// Path of the device description document.
pub const DESCRIPTION_PATH: &str = "/tr64desc.xml";

/// Expands a short service id such as `WANIPConnection:1` into its full
/// namespace. Ids that already start with `urn:` are returned unchanged.
pub fn service_namespace(service: &str) -> String {
    if service.get(..4).is_some_and(|scheme| scheme.eq_ignore_ascii_case("urn:")) {
        String::from(service)
    } else {
        format!("{SERVICE_PREFIX}{service}")
    }
}

/// Mapping from service type to control URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDirectory {
    services: BTreeMap<String, String>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from a buffered description document.
    pub fn from_description(document: &str) -> Self {
        let mut directory = Self::new();
        let mut scanner = TagScanner::new(SliceSource::new(document.as_bytes()));
        let Ok(_) = directory.populate(&mut scanner);
        directory
    }

    /// Adds a service. A later entry for the same type replaces the earlier one.
    pub fn insert(&mut self, service_type: impl Into<String>, control_url: impl Into<String>) {
        self.services.insert(service_type.into(), control_url.into());
    }

    /// Looks up the control URL of a service.
    ///
    /// The id is matched exactly first, then as a short id expanded with
    /// [`SERVICE_PREFIX`], and finally ignoring ASCII case.
    pub fn control_url(&self, service: &str) -> Option<&str> {
        if let Some(url) = self.services.get(service) {
            return Some(url);
        }
        let namespace = service_namespace(service);
        if let Some(url) = self.services.get(&namespace) {
            return Some(url);
        }
        self.services
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(service) || key.eq_ignore_ascii_case(&namespace))
            .map(|(_, url)| url.as_str())
    }

    pub fn contains(&self, service: &str) -> bool {
        self.control_url(service).is_some()
    }

    /// Iterates over `(service type, control URL)` pairs in key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter { inner: self.services.iter() }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    /// Reads `serviceType`/`controlURL` pairs from a description document.
    ///
    /// Stops when no further `serviceType` is found or after [`MAX_SERVICES`]
    /// entries, and returns the number of entries read. Entries with an empty
    /// type or control URL are skipped.
    pub fn populate<S: ByteSource>(
        &mut self,
        scanner: &mut TagScanner<S>,
    ) -> Result<usize, S::Error> {
        let mut read = 0;
        loop {
            if read >= MAX_SERVICES {
                if extract_single_streaming(scanner, "serviceType")?.is_some() {
                    warn!("description lists more than {MAX_SERVICES} services, ignoring the rest");
                }
                break;
            }
            let Some(service_type) = extract_single_streaming(scanner, "serviceType")? else {
                break;
            };
            let Some(control_url) = extract_single_streaming(scanner, "controlURL")? else {
                warn!("service {service_type} has no control URL");
                break;
            };
            if service_type.is_empty() || control_url.is_empty() {
                warn!("skipping service entry with empty type or control URL ({service_type:?})");
                continue;
            }
            debug!("service {service_type} at {control_url}");
            self.insert(service_type, control_url);
            read += 1;
        }
        info!("discovered {} services", self.services.len());
        Ok(read)
    }
}

impl<'a> IntoIterator for &'a ServiceDirectory {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`ServiceDirectory`].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, String, String>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(service, url)| (service.as_str(), url.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    const TWO_SERVICES: &str = "<?xml version=\"1.0\"?>\
        <root><device><serviceList>\
        <service><serviceType>A</serviceType><serviceId>a1</serviceId><controlURL>/a</controlURL></service>\
        <service><serviceType>B</serviceType><serviceId>b1</serviceId><controlURL>/b</controlURL></service>\
        </serviceList></device></root>";

    #[test]
    fn test_two_services() {
        let directory = ServiceDirectory::from_description(TWO_SERVICES);
        let entries: Vec<_> = directory.iter().collect();
        assert_eq!(entries, [("A", "/a"), ("B", "/b")]);
    }

    #[test]
    fn test_lookup_policy() {
        let mut directory = ServiceDirectory::new();
        directory.insert("urn:dslforum-org:service:DeviceInfo:1", "/upnp/control/deviceinfo");
        directory.insert("Custom", "/custom");

        assert_eq!(
            directory.control_url("urn:dslforum-org:service:DeviceInfo:1"),
            Some("/upnp/control/deviceinfo")
        );
        assert_eq!(directory.control_url("DeviceInfo:1"), Some("/upnp/control/deviceinfo"));
        assert_eq!(directory.control_url("deviceinfo:1"), Some("/upnp/control/deviceinfo"));
        assert_eq!(directory.control_url("custom"), Some("/custom"));
        assert_eq!(directory.control_url("Missing:1"), None);
    }

    #[test]
    fn test_exact_match_wins_over_case_insensitive() {
        let mut directory = ServiceDirectory::new();
        directory.insert("svc", "/lower");
        directory.insert("SVC", "/upper");
        assert_eq!(directory.control_url("SVC"), Some("/upper"));
        assert_eq!(directory.control_url("svc"), Some("/lower"));
    }

    #[test]
    fn test_duplicate_last_write_wins() {
        let document = "<service><serviceType>A</serviceType><controlURL>/old</controlURL></service>\
                        <service><serviceType>A</serviceType><controlURL>/new</controlURL></service>";
        let directory = ServiceDirectory::from_description(document);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.control_url("A"), Some("/new"));
    }

    #[test]
    fn test_empty_entries_are_skipped() {
        let document = "<service><serviceType>urn:dslforum-org:service:X:1</serviceType><controlURL></controlURL></service>\
                        <service><serviceType></serviceType><controlURL>/y</controlURL></service>\
                        <service><serviceType>Z:1</serviceType><controlURL/></service>\
                        <service><serviceType>A</serviceType><controlURL>/a</controlURL></service>";
        let mut directory = ServiceDirectory::new();
        let mut scanner = TagScanner::new(SliceSource::new(document.as_bytes()));
        assert_eq!(directory.populate(&mut scanner).unwrap(), 1);
        let entries: Vec<_> = directory.iter().collect();
        assert_eq!(entries, [("A", "/a")]);
    }

    #[test]
    fn test_cap_at_max_services() {
        let mut document = String::from("<root>");
        for i in 0..500 {
            document.push_str(&format!(
                "<service><serviceType>S{i}</serviceType><controlURL>/s{i}</controlURL></service>"
            ));
        }
        document.push_str("</root>");

        let mut directory = ServiceDirectory::new();
        let mut scanner = TagScanner::new(SliceSource::new(document.as_bytes()));
        let read = directory.populate(&mut scanner).unwrap();

        assert_eq!(read, MAX_SERVICES);
        assert_eq!(directory.len(), MAX_SERVICES);
        assert!(directory.contains("S199"));
        assert!(!directory.contains("S200"));
    }

    #[test]
    fn test_empty_document() {
        assert!(ServiceDirectory::from_description("<root></root>").is_empty());
        assert!(ServiceDirectory::from_description("").is_empty());
    }

    #[test]
    fn test_service_namespace() {
        assert_eq!(service_namespace("WANIPConnection:1"), "urn:dslforum-org:service:WANIPConnection:1");
        assert_eq!(service_namespace("urn:schemas-upnp-org:service:X:1"), "urn:schemas-upnp-org:service:X:1");
    }
}
