//! SMTP delivery against a local mock relay, through the resolver and the
//! mailer.

mod support;

use std::time::Duration;

use courier_common::{MailSettings, Message, config::ClientTimeouts, settings::keys};
use courier_transport::{
    Mailer, Outcome, Transport, TransportError, TransportResolver,
    smtp::{Credentials, SmtpTransport},
};
use pretty_assertions::assert_eq;
use support::mock_server::{MockSmtpServer, SmtpCommand};

fn message() -> Message {
    Message::new(
        Some("editor@example.org".to_string()),
        vec![
            "reader@example.com".to_string(),
            "archive@example.com".to_string(),
        ],
        b"From: editor@example.org\r\nTo: reader@example.com\r\nSubject: Issue 42\r\n\r\nHello\r\n.hidden line\n"
            .to_vec(),
    )
}

#[tokio::test]
async fn test_full_transaction() {
    let server = MockSmtpServer::builder().build().await.expect("bind");
    let transport = SmtpTransport::new("127.0.0.1", server.addr().port());

    let outcome = transport.send(&message()).await.expect("delivered");
    assert_eq!(outcome, Outcome::Sent { recipients: 2 });

    assert_eq!(
        server.commands().await,
        vec![
            SmtpCommand::Ehlo("example.org".to_string()),
            SmtpCommand::MailFrom("FROM:<editor@example.org>".to_string()),
            SmtpCommand::RcptTo("TO:<reader@example.com>".to_string()),
            SmtpCommand::RcptTo("TO:<archive@example.com>".to_string()),
            SmtpCommand::Data,
            SmtpCommand::Content(
                "From: editor@example.org\r\nTo: reader@example.com\r\nSubject: Issue 42\r\n\r\nHello\r\n..hidden line\r\n"
                    .to_string()
            ),
            SmtpCommand::Quit,
        ]
    );
}

#[tokio::test]
async fn test_auth_plain() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.example.test", "AUTH PLAIN LOGIN"])
        .build()
        .await
        .expect("bind");
    let transport =
        SmtpTransport::new("127.0.0.1", server.addr().port()).with_credentials(Some(Credentials {
            username: "courier".to_string(),
            password: "secret".to_string(),
        }));

    transport.send(&message()).await.expect("delivered");

    let commands = server.commands().await;
    // base64("\0courier\0secret")
    assert!(commands.contains(&SmtpCommand::Auth("PLAIN AGNvdXJpZXIAc2VjcmV0".to_string())));
}

#[tokio::test]
async fn test_auth_requires_advertisement() {
    let server = MockSmtpServer::builder().build().await.expect("bind");
    let transport =
        SmtpTransport::new("127.0.0.1", server.addr().port()).with_credentials(Some(Credentials {
            username: "courier".to_string(),
            password: "secret".to_string(),
        }));

    let err = transport.send(&message()).await.expect_err("no AUTH offered");
    assert!(matches!(err, TransportError::Unsupported("AUTH")), "{err}");
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_rejected_recipient() {
    let server = MockSmtpServer::builder()
        .with_rcpt_to_response(550, "No such user")
        .build()
        .await
        .expect("bind");
    let transport = SmtpTransport::new("127.0.0.1", server.addr().port());

    let err = transport.send(&message()).await.expect_err("rejected");
    match err {
        TransportError::Rejected {
            command,
            code,
            ref message,
        } => {
            assert_eq!(command, "RCPT TO");
            assert_eq!(code, 550);
            assert_eq!(message, "No such user");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!server.commands().await.contains(&SmtpCommand::Data));
}

#[tokio::test]
async fn test_slow_relay_times_out() {
    let server = MockSmtpServer::builder()
        .with_reply_delay(Duration::from_secs(5))
        .build()
        .await
        .expect("bind");
    let timeouts = ClientTimeouts {
        command_secs: 1,
        envelope_secs: 1,
        ..ClientTimeouts::default()
    };
    let transport = SmtpTransport::new("127.0.0.1", server.addr().port()).with_timeouts(timeouts);

    let err = transport.send(&message()).await.expect_err("timed out");
    assert!(
        matches!(err, TransportError::Timeout { command: "EHLO", .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_spooled_smtp_mail_is_sent_on_flush() {
    let server = MockSmtpServer::builder().build().await.expect("bind");
    let settings = MailSettings::from([
        (keys::TRANSPORT, "smtp".to_string()),
        (keys::SMTP_SERVER, server.server()),
        (keys::SPOOL, "memory".to_string()),
        (keys::DEFAULT_FROM_ADDRESS, "noreply@example.org".to_string()),
    ]);
    let mailer = Mailer::new(&TransportResolver::new(&settings)).expect("valid settings");
    assert_eq!(mailer.real_transport().port(), Some(server.addr().port()));

    let anonymous = Message::new(
        None,
        vec!["reader@example.com".to_string()],
        b"To: reader@example.com\r\n\r\nHello\r\n".to_vec(),
    );
    let outcome = mailer.send(anonymous).await.expect("queued");
    assert!(matches!(outcome, Outcome::Queued(_)));
    assert!(server.commands().await.is_empty());

    let report = mailer.flush_queue().await.expect("flush");
    assert_eq!(report.sent, 1);
    assert!(report.is_clean());

    let commands = server.commands().await;
    assert!(commands.contains(&SmtpCommand::MailFrom(
        "FROM:<noreply@example.org>".to_string()
    )));
    assert!(commands.iter().any(|command| matches!(
        command,
        SmtpCommand::Content(content) if content.starts_with("From: <noreply@example.org>\r\n")
    )));
}
