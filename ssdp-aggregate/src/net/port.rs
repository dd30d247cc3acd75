use std::collections::HashSet;

/// First port considered when looking for a free one.
pub const FIRST_CANDIDATE_PORT: u16 = 1024;

/// Number of consecutive ports considered when looking for a free one.
pub const PORT_CANDIDATES: u16 = 500;

/// Returns the lowest candidate port not present in `active_listeners`.
///
/// `active_listeners` is a snapshot of the ports local listeners are bound to, as reported by
/// the operating system.
pub fn first_free_port<I>(active_listeners: I) -> Option<u16>
where
    I: IntoIterator<Item = u16>,
{
    let in_use = active_listeners.into_iter().collect::<HashSet<_>>();

    (FIRST_CANDIDATE_PORT..FIRST_CANDIDATE_PORT + PORT_CANDIDATES).find(|port| !in_use.contains(port))
}
