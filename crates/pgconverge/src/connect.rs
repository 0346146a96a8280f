//! Opening a connection from user-supplied parameters.

use tokio_postgres::{Client, NoTls};

use crate::{Error, Result};

/// Where and how to connect.
///
/// Empty strings mean "not given". When `url` is set it wins over every
/// other field.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// A `postgres://` URL or a `key=value` connection string.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Directory holding the server's unix socket.
    pub unix_socket: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            url: None,
            host: String::new(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            unix_socket: String::new(),
        }
    }
}

impl ConnectionParams {
    /// Build the tokio-postgres configuration for these parameters.
    pub fn to_config(&self) -> Result<tokio_postgres::Config> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.parse().map_err(Error::Connection);
        }

        let mut config = tokio_postgres::Config::new();
        config.application_name("pgconverge");
        config.port(self.port);
        if !self.user.is_empty() {
            config.user(&self.user);
        }
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        if !self.database.is_empty() {
            config.dbname(&self.database);
        }

        let is_localhost = self.host.is_empty() || self.host == "localhost";
        if is_localhost && !self.unix_socket.is_empty() {
            config.host(&self.unix_socket);
        } else if self.host.is_empty() {
            config.host("localhost");
        } else {
            config.host(&self.host);
        }

        Ok(config)
    }

    /// A description of the target that is safe to log.
    pub fn redacted(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return mask_password(url);
        }
        let host = if (self.host.is_empty() || self.host == "localhost")
            && !self.unix_socket.is_empty()
        {
            self.unix_socket.as_str()
        } else if self.host.is_empty() {
            "localhost"
        } else {
            self.host.as_str()
        };
        format!("{}@{}:{}/{}", self.user, host, self.port, self.database)
    }
}

/// Connect and spawn the connection task onto the current tokio runtime.
pub async fn connect(params: &ConnectionParams) -> Result<Client> {
    let config = params.to_config()?;
    tracing::debug!(db = %params.redacted(), "connecting");

    let (client, connection) = config.connect(NoTls).await.map_err(Error::Connection)?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("database connection error: {}", e);
        }
    });

    Ok(client)
}

/// Mask the password in a connection URL or `key=value` string for display.
pub fn mask_password(url: &str) -> String {
    let Some(start) = url.find("://") else {
        return mask_keyword_password(url, false);
    };

    let mut masked = url.to_string();
    if let Some(at) = url.rfind('@') {
        if at > start {
            let prefix = &url[..start + 3];
            let suffix = &url[at..];
            if let Some(colon) = url[start + 3..at].find(':') {
                let user = &url[start + 3..start + 3 + colon];
                masked = format!("{}{}:***{}", prefix, user, suffix);
            }
        }
    }
    mask_keyword_password(&masked, true)
}

/// Replace the value of every `password=` keyword.
///
/// In a URL the value runs to the next `&`; in a `key=value` string it is
/// either single-quoted (with backslash escapes) or runs to the next space.
fn mask_keyword_password(s: &str, in_url: bool) -> String {
    const KEY: &str = "password";
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;

    while let Some(found) = s[pos..].find(KEY) {
        let key_start = pos + found;
        let mut i = key_start + KEY.len();

        let at_boundary = key_start == 0
            || matches!(bytes[key_start - 1], b'?' | b'&')
            || (!in_url && bytes[key_start - 1].is_ascii_whitespace());
        if !in_url {
            while i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
        }
        if !at_boundary || bytes.get(i) != Some(&b'=') {
            out.push_str(&s[pos..key_start + KEY.len()]);
            pos = key_start + KEY.len();
            continue;
        }
        i += 1;
        if !in_url {
            while i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
        }

        let value_end = if in_url {
            s[i..].find('&').map_or(s.len(), |n| i + n)
        } else if bytes.get(i) == Some(&b'\'') {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != b'\'' {
                if bytes[j] == b'\\' {
                    j += 1;
                }
                j += 1;
            }
            (j + 1).min(s.len())
        } else {
            s[i..]
                .find(|c: char| c.is_ascii_whitespace())
                .map_or(s.len(), |n| i + n)
        };

        out.push_str(&s[pos..i]);
        out.push_str("***");
        pos = value_end;
    }

    out.push_str(&s[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::config::Host;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://app:s3cret@db:5432/app"),
            "postgres://app:***@db:5432/app"
        );
        assert_eq!(
            mask_password("postgres://app@db/app"),
            "postgres://app@db/app"
        );
        assert_eq!(mask_password("host=db user=app"), "host=db user=app");
    }

    #[test]
    fn test_mask_password_in_keyword_strings() {
        assert_eq!(
            mask_password("host=db user=app password=hunter2 dbname=app"),
            "host=db user=app password=*** dbname=app"
        );
        assert_eq!(
            mask_password("password = 'it\\'s secret' host=db"),
            "password = *** host=db"
        );
        assert_eq!(
            mask_password("postgres://app@db/app?password=hunter2&sslmode=disable"),
            "postgres://app@db/app?password=***&sslmode=disable"
        );
        // Only the keyword is masked, not lookalikes.
        assert_eq!(
            mask_password("host=db user=password_admin"),
            "host=db user=password_admin"
        );
    }

    #[test]
    fn test_redacted_keyword_url_hides_password() {
        let params = ConnectionParams {
            url: Some("host=db user=app password=hunter2".to_string()),
            ..Default::default()
        };
        let redacted = params.redacted();
        assert!(!redacted.contains("hunter2"));
        assert_eq!(redacted, "host=db user=app password=***");
    }

    #[test]
    fn test_unix_socket_used_for_localhost() {
        let params = ConnectionParams {
            unix_socket: "/var/run/postgresql".to_string(),
            ..Default::default()
        };
        let config = params.to_config().unwrap();
        assert_eq!(config.get_hosts().len(), 1);
        assert!(matches!(&config.get_hosts()[0], Host::Unix(p) if p.to_str() == Some("/var/run/postgresql")));
    }

    #[test]
    fn test_unix_socket_ignored_for_remote_host() {
        let params = ConnectionParams {
            host: "db.internal".to_string(),
            unix_socket: "/var/run/postgresql".to_string(),
            ..Default::default()
        };
        let config = params.to_config().unwrap();
        assert!(matches!(&config.get_hosts()[0], Host::Tcp(h) if h == "db.internal"));
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionParams::default().to_config().unwrap();
        assert_eq!(config.get_user(), Some("postgres"));
        assert_eq!(config.get_dbname(), Some("postgres"));
        assert_eq!(config.get_ports(), &[5432]);
        assert_eq!(config.get_password(), None);
    }

    #[test]
    fn test_url_wins() {
        let params = ConnectionParams {
            url: Some("postgres://app:pw@db:6543/appdb".to_string()),
            host: "ignored".to_string(),
            ..Default::default()
        };
        let config = params.to_config().unwrap();
        assert_eq!(config.get_user(), Some("app"));
        assert_eq!(config.get_dbname(), Some("appdb"));
        assert_eq!(config.get_ports(), &[6543]);
        assert_eq!(params.redacted(), "postgres://app:***@db:6543/appdb");
    }

    #[test]
    fn test_bad_url_is_connection_error() {
        let params = ConnectionParams {
            url: Some("postgres://db:notaport/x".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.to_config(), Err(Error::Connection(_))));
    }
}
