/// How outgoing repository requests pick their proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyMode {
    #[default]
    None,
    System,
    Manual(String),
}

impl ProxyMode {
    /// `--proxy` always wins; otherwise a usable `http_proxy` value seeds a
    /// manual proxy on platforms that honor it.
    pub fn resolve(system_requested: bool, http_proxy: Option<&str>, honor_env: bool) -> Self {
        if system_requested {
            return Self::System;
        }
        if !honor_env {
            return Self::None;
        }
        match http_proxy.and_then(normalize_proxy_url) {
            Some(url) => Self::Manual(url),
            None => Self::None,
        }
    }

    /// Whether the `http_proxy` environment variable is consulted on this platform.
    pub fn env_supported() -> bool {
        cfg!(all(unix, not(target_vendor = "apple")))
    }
}

fn normalize_proxy_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let (scheme, rest) = with_scheme.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return None;
    }
    let authority = rest.split('/').next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    if host.is_empty() {
        return None;
    }

    Some(with_scheme)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComponentStyle {
    #[default]
    Regular,
    Italic,
}

/// Process-wide switches, built once at startup and passed to whoever needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub verbose: bool,
    pub virtual_components_visible: bool,
    pub virtual_component_style: ComponentStyle,
    pub no_force_installations: bool,
    pub proxy: ProxyMode,
}

impl RuntimeOptions {
    pub fn show_virtual_components(&mut self) {
        self.virtual_components_visible = true;
        self.virtual_component_style = ComponentStyle::Italic;
    }
}
