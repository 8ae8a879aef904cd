//! `AUTH LOGIN` exchange.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::command::Command;
use crate::connection::Connection;
use crate::error::Result;
use crate::types::{Credentials, Reply};

/// Authenticates with `AUTH LOGIN`.
///
/// Sends the mechanism, then the base64 username and password, each on its
/// own line. There is no retry; the first rejected step ends the exchange.
///
/// # Errors
///
/// Returns [`crate::Error::UnexpectedReply`] for the first step the server
/// rejects, or the I/O error.
pub async fn auth_login<C>(conn: &mut Connection<C>, credentials: &Credentials) -> Result<Reply>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    info!("Authenticating as {}", credentials.username());

    let login = Command::AuthLogin;
    conn.execute(&login, login.expected()).await?;

    let username = Command::AuthUsername(STANDARD.encode(credentials.username()));
    conn.execute(&username, username.expected()).await?;

    let password = Command::AuthPassword(STANDARD.encode(credentials.password()));
    conn.execute(&password, password.expected()).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::parser::ParserLimits;
    use crate::types::ReplyCode;
    use tokio_test::io::Builder;

    fn credentials() -> Credentials {
        Credentials::new("user", "pass")
    }

    #[tokio::test]
    async fn login_succeeds() {
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n")
            .build();
        let mut conn = Connection::new(mock, ParserLimits::default(), None);

        let reply = auth_login(&mut conn, &credentials()).await.unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_SUCCEEDED);
    }

    #[tokio::test]
    async fn rejected_password_fails() {
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();
        let mut conn = Connection::new(mock, ParserLimits::default(), None);

        let err = auth_login(&mut conn, &credentials()).await.unwrap_err();
        assert_eq!(err.reply_code(), Some(ReplyCode::AUTH_FAILED));
        assert!(matches!(err, Error::UnexpectedReply { command, .. } if command == "<password>"));
    }

    #[tokio::test]
    async fn username_step_requires_intermediate_reply() {
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"235 ok\r\n")
            .build();
        let mut conn = Connection::new(mock, ParserLimits::default(), None);

        let err = auth_login(&mut conn, &credentials()).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply { command, .. } if command == "<username>"));
    }

    #[tokio::test]
    async fn unsupported_mechanism_stops_early() {
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(b"504 5.5.4 Unrecognized authentication type\r\n")
            .build();
        let mut conn = Connection::new(mock, ParserLimits::default(), None);

        let err = auth_login(&mut conn, &credentials()).await.unwrap_err();
        assert!(err.is_permanent());
    }
}
