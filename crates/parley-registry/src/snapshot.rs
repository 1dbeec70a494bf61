//! Point-in-time copies of the registry.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use parley_protocol::SessionId;
use parley_transport::ConnectionId;

use crate::{ClientInfo, SessionInfo};

/// Every client and session, copied under a single lock acquisition.
///
/// Clients are in connection order and sessions in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// All registered clients, logged in or not.
    pub clients: Vec<ClientInfo>,
    /// All live sessions.
    pub sessions: Vec<SessionInfo>,
}

impl RegistrySnapshot {
    /// Verifies the registry invariants against this snapshot.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut conn_ids = HashSet::new();
        let mut users = HashSet::new();
        for client in &self.clients {
            if !conn_ids.insert(client.conn_id) {
                return Err(format!("{} registered twice", client.conn_id));
            }
            if let Some(user) = &client.user {
                if !users.insert(user) {
                    return Err(format!("user {user} logged in twice"));
                }
            }
        }

        let mut sessions: BTreeMap<&SessionId, BTreeSet<ConnectionId>> =
            BTreeMap::new();
        for session in &self.sessions {
            if session.members.is_empty() {
                return Err(format!("session {} has no members", session.id));
            }
            sessions.insert(&session.id, session.members.iter().copied().collect());
        }

        for client in &self.clients {
            let Some(session) = &client.session else {
                continue;
            };
            if client.user.is_none() {
                return Err(format!(
                    "{} is in session {session} without logging in",
                    client.conn_id
                ));
            }
            match sessions.get(session) {
                None => {
                    return Err(format!(
                        "{} points at missing session {session}",
                        client.conn_id
                    ));
                }
                Some(members) if !members.contains(&client.conn_id) => {
                    return Err(format!(
                        "{} not listed as a member of {session}",
                        client.conn_id
                    ));
                }
                Some(_) => {}
            }
        }

        for (session, members) in &sessions {
            for member in members {
                let listed = self.clients.iter().any(|client| {
                    client.conn_id == *member
                        && client.session.as_ref() == Some(*session)
                });
                if !listed {
                    return Err(format!(
                        "{session} lists {member} but the client disagrees"
                    ));
                }
            }
        }

        Ok(())
    }
}
