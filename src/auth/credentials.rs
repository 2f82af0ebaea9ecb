use crate::api::ClientCredentialsGrant;
use anyhow::{Context, Result};
use log::info;
use std::collections::HashMap;
use std::path::Path;

const HOST: &str = "DYNAMICS_HOST";
const TENANT_ID: &str = "DYNAMICS_TENANT_ID";
const CLIENT_ID: &str = "DYNAMICS_CLIENT_ID";
const CLIENT_SECRET: &str = "DYNAMICS_CLIENT_SECRET";

/// Application registration used for the client-credentials grant
#[derive(Clone)]
pub struct ClientCredentials {
    pub host: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn from_env() -> Result<ClientCredentials> {
        info!("Importing from environment variables");

        let var = |name: &str| {
            std::env::var(name).with_context(|| format!("{} environment variable not set", name))
        };

        Ok(ClientCredentials {
            host: var(HOST)?,
            tenant_id: var(TENANT_ID)?,
            client_id: var(CLIENT_ID)?,
            client_secret: var(CLIENT_SECRET)?,
        })
    }

    /// Read credentials from a `.env` file without touching the process
    /// environment
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<ClientCredentials> {
        let path = path.as_ref();
        info!("Importing from .env file: {}", path.display());

        if !path.exists() {
            anyhow::bail!("Environment file not found: {}", path.display());
        }

        let mut vars = HashMap::new();
        let entries = dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to load .env file '{}'", path.display()))?;
        for entry in entries {
            let (key, value) =
                entry.with_context(|| format!("Failed to parse .env file '{}'", path.display()))?;
            vars.insert(key, value);
        }

        let mut take = |name: &str| {
            vars.remove(name)
                .with_context(|| format!("{} not found in .env file: {}", name, path.display()))
        };

        Ok(ClientCredentials {
            host: take(HOST)?,
            tenant_id: take(TENANT_ID)?,
            client_id: take(CLIENT_ID)?,
            client_secret: take(CLIENT_SECRET)?,
        })
    }

    /// Organization URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }

    /// Client-credentials grant scoped to this organization
    pub fn to_grant(&self) -> ClientCredentialsGrant {
        ClientCredentialsGrant::new(&self.tenant_id, self.base_url(), &self.client_id, &self.client_secret)
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("host", &self.host)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_env_file() {
        let file = env_file(
            "DYNAMICS_HOST=https://org.crm.dynamics.com/\n\
             DYNAMICS_TENANT_ID=contoso\n\
             DYNAMICS_CLIENT_ID=app\n\
             DYNAMICS_CLIENT_SECRET=\"s3cret\"\n",
        );

        let credentials = ClientCredentials::from_env_file(file.path()).unwrap();
        assert_eq!(credentials.base_url(), "https://org.crm.dynamics.com");
        assert_eq!(credentials.client_secret, "s3cret");

        let grant = credentials.to_grant();
        assert_eq!(grant.resource(), "https://org.crm.dynamics.com");
        assert_eq!(grant.client_id(), "app");
        assert_eq!(grant.token_endpoint(), "https://login.microsoftonline.com/contoso/oauth2/token");
    }

    #[test]
    fn missing_variable_is_named() {
        let file = env_file("DYNAMICS_HOST=https://org.crm.dynamics.com\nDYNAMICS_CLIENT_ID=app\n");

        let error = ClientCredentials::from_env_file(file.path()).unwrap_err();
        assert!(error.to_string().contains("DYNAMICS_TENANT_ID"));
    }

    #[test]
    fn missing_file_fails() {
        assert!(ClientCredentials::from_env_file("/nonexistent/.env").is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let file = env_file(
            "DYNAMICS_HOST=h\nDYNAMICS_TENANT_ID=t\nDYNAMICS_CLIENT_ID=c\nDYNAMICS_CLIENT_SECRET=topsecret\n",
        );
        let credentials = ClientCredentials::from_env_file(file.path()).unwrap();
        assert!(!format!("{:?}", credentials).contains("topsecret"));
    }
}
