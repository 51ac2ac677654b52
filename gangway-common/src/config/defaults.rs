use std::net::ToSocketAddrs;
use std::time::Duration;

use crate::{ListenEndpoint, Secret};

pub(crate) const fn _default_true() -> bool {
    true
}

pub(crate) const fn _default_false() -> bool {
    false
}

pub(crate) const fn _default_ssh_port() -> u16 {
    22
}

#[inline]
pub(crate) fn _default_term() -> String {
    "xterm-color".to_owned()
}

#[inline]
pub(crate) fn _default_ready_timeout() -> Duration {
    Duration::from_secs(20)
}

#[inline]
pub(crate) fn _default_keepalive_interval() -> Duration {
    Duration::from_secs(120)
}

pub(crate) const fn _default_keepalive_count_max() -> usize {
    10
}

#[inline]
pub(crate) fn _default_session_name() -> String {
    "gangway.sid".to_owned()
}

#[inline]
pub(crate) fn _default_session_secret() -> Secret<String> {
    Secret::random()
}

#[inline]
pub(crate) fn _default_session_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

#[inline]
pub(crate) fn _default_http_listen() -> ListenEndpoint {
    #[allow(clippy::unwrap_used)]
    ListenEndpoint("0.0.0.0:2222".to_socket_addrs().unwrap().next().unwrap())
}

#[inline]
pub(crate) fn _default_origins() -> Vec<String> {
    vec!["*:*".to_owned()]
}

#[inline]
pub(crate) fn _default_header_background() -> String {
    "green".to_owned()
}

pub(crate) const fn _default_rows() -> u16 {
    24
}

pub(crate) const fn _default_cols() -> u16 {
    80
}
