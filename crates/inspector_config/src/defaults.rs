// Default functions referenced from serde attributes

pub const DEFAULT_PORT: i32 = 9229;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_port() -> i32 {
    DEFAULT_PORT
}

pub(crate) fn default_host() -> String {
    "127.0.0.1".into()
}

pub(crate) fn default_context_group_id() -> i32 {
    1
}

pub(crate) fn default_context_name() -> String {
    "main".into()
}

pub(crate) fn default_target_id() -> String {
    "0".into()
}

pub(crate) fn default_target_title() -> String {
    "Puerts Inspector".into()
}

pub(crate) fn default_target_description() -> String {
    "Puerts Inspector".into()
}

pub(crate) fn default_target_type() -> String {
    "node".into()
}

pub(crate) fn default_browser() -> String {
    "Puerts/v1.0.0".into()
}

pub(crate) fn default_protocol_version() -> String {
    "1.1".into()
}
