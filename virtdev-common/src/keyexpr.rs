/// Default key expression prefix for the local object bus.
pub const KEY_PREFIX: &str = "venus";

/// Namespace shared by every device service name.
pub const SERVICE_NAMESPACE: &str = "com.victronenergy";

/// Build the bus service name of a virtual device.
///
/// # Example
/// ```
/// use virtdev_common::keyexpr::service_name;
///
/// assert_eq!(
///     service_name("tank", "1234"),
///     "com.victronenergy.tank.virtual_1234"
/// );
/// ```
pub fn service_name(class: &str, serial: &str) -> String {
    format!("{}.{}.virtual_{}", SERVICE_NAMESPACE, class, serial)
}

/// Key expressions of one device service.
///
/// Layout:
/// - `<prefix>/<service>/<path>` property values
/// - `<prefix>/<service>/@/set/<path>` write requests
/// - `<prefix>/<service>/@/status` instance status
/// - `<prefix>/<service>/@/alive` liveliness token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceKeys {
    prefix: String,
    service: String,
}

impl ServiceKeys {
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_prefix(KEY_PREFIX, service)
    }

    pub fn with_prefix(prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Key of a property path such as `/Dc/0/Voltage`.
    ///
    /// # Example
    /// ```
    /// use virtdev_common::keyexpr::ServiceKeys;
    ///
    /// let keys = ServiceKeys::new("com.victronenergy.battery.virtual_1");
    /// assert_eq!(
    ///     keys.property("/Dc/0/Voltage"),
    ///     "venus/com.victronenergy.battery.virtual_1/Dc/0/Voltage"
    /// );
    /// ```
    pub fn property(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.prefix,
            self.service,
            path.trim_start_matches('/')
        )
    }

    /// Key on which a write to `path` is requested.
    pub fn set_key(&self, path: &str) -> String {
        format!(
            "{}/{}/@/set/{}",
            self.prefix,
            self.service,
            path.trim_start_matches('/')
        )
    }

    /// Wildcard matching every write request of this service.
    pub fn set_wildcard(&self) -> String {
        format!("{}/{}/@/set/**", self.prefix, self.service)
    }

    pub fn status_key(&self) -> String {
        format!("{}/{}/@/status", self.prefix, self.service)
    }

    pub fn alive_key(&self) -> String {
        format!("{}/{}/@/alive", self.prefix, self.service)
    }

    /// Recover the property path (`/A/B`) from a write request key.
    ///
    /// Returns `None` if the key does not belong to this service's write space.
    pub fn path_from_set_key(&self, key: &str) -> Option<String> {
        let rest = key
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')?
            .strip_prefix(self.service.as_str())?
            .strip_prefix("/@/set/")?;
        if rest.is_empty() {
            return None;
        }
        Some(format!("/{}", rest))
    }
}

/// Wildcard matching the liveliness token of every device service.
///
/// # Example
/// ```
/// use virtdev_common::keyexpr::all_alive_wildcard;
///
/// assert_eq!(all_alive_wildcard("venus"), "venus/*/@/alive");
/// ```
pub fn all_alive_wildcard(prefix: &str) -> String {
    format!("{}/*/@/alive", prefix)
}
