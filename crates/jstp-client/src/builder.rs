//! Connection builder pattern

use std::sync::Arc;

use jstp_transport::Transport;

use crate::connection::{Connection, ConnectionListener};
use crate::error::{ClientError, Result};
use crate::policy::{
    DropRestorationPolicy, RestorationPolicy, SessionPolicy, SimpleSessionPolicy,
};

/// Builder for [`Connection`]
pub struct ConnectionBuilder {
    transport: Arc<dyn Transport>,
    app_name: Option<String>,
    session_id: Option<String>,
    restoration: Box<dyn RestorationPolicy>,
    session: Box<dyn SessionPolicy>,
    listeners: Vec<Arc<dyn ConnectionListener>>,
}

impl ConnectionBuilder {
    /// Create a new builder over `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            app_name: None,
            session_id: None,
            restoration: Box::new(DropRestorationPolicy::default()),
            session: Box::new(SimpleSessionPolicy::default()),
            listeners: Vec::new(),
        }
    }

    /// Set application name sent in handshakes
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Resume an existing session on connect
    pub fn session_id(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }

    pub fn restoration_policy(mut self, policy: impl RestorationPolicy + 'static) -> Self {
        self.restoration = Box::new(policy);
        self
    }

    pub fn session_policy(mut self, policy: impl SessionPolicy + 'static) -> Self {
        self.session = Box::new(policy);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ConnectionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build without sending anything
    pub fn build(self) -> Arc<Connection> {
        let connection = Connection::from_parts(
            self.transport,
            self.app_name,
            self.session_id,
            self.restoration,
            self.session,
        );
        for listener in self.listeners {
            connection.add_listener(listener);
        }
        Arc::new(connection)
    }

    /// Build and send the handshake
    pub fn connect(self) -> Result<Arc<Connection>> {
        let app_name = self.app_name.clone().ok_or(ClientError::MissingAppName)?;
        let session_id = self.session_id.clone();

        let connection = self.build();
        connection.handshake(&app_name, session_id.as_deref())?;
        Ok(connection)
    }
}
