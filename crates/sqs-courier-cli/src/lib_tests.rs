//! Tests for the sqs-courier-cli library module.

use super::*;
use sqs_courier::providers::{queue_url_for, InMemoryTransport};
use sqs_courier::TransportError;

fn runner() -> (Arc<InMemoryTransport>, CommandRunner<InMemoryTransport>) {
    let transport = Arc::new(InMemoryTransport::new());
    let runner = CommandRunner::new(transport.clone(), CourierConfig::default(), false);
    (transport, runner)
}

fn command(args: &[&str]) -> Commands {
    let mut argv = vec!["sqs-courier"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

fn output_lines(out: Vec<u8>) -> Vec<Value> {
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============================================================================
// Argument Parsing Tests
// ============================================================================

mod parsing {
    use super::*;

    #[test]
    fn test_send_arguments() {
        let cli = Cli::try_parse_from([
            "sqs-courier",
            "send",
            "https://queue",
            "hello",
            "--attribute",
            "tenant=acme",
            "-a",
            "region=eu",
            "--delay",
            "30",
        ])
        .unwrap();

        match cli.command {
            Commands::Send {
                queue_url,
                body,
                attributes,
                delay,
                ..
            } => {
                assert_eq!(queue_url, "https://queue");
                assert_eq!(body, "hello");
                assert_eq!(
                    attributes,
                    vec![
                        ("tenant".to_string(), "acme".to_string()),
                        ("region".to_string(), "eu".to_string())
                    ]
                );
                assert_eq!(delay, Some(30));
            }
            other => panic!("Expected Send command, got {:?}", other),
        }
    }

    /// Verify global flags are accepted after the subcommand
    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sqs-courier",
            "list-queues",
            "--region",
            "eu-west-1",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert!(cli.json_logs);
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_malformed_attribute_is_rejected() {
        let result = Cli::try_parse_from(["sqs-courier", "send", "https://queue", "x", "-a", "novalue"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert_eq!(parse_key_value("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("plain").is_err());
    }
}

// ============================================================================
// Configuration Tests
// ============================================================================

mod configuration {
    use super::*;

    /// Verify command-line overrides win over the configuration file
    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"aws:\n  region: us-east-1\nconsumer:\n  max_messages_per_fetch: 2\n")
            .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "sqs-courier",
            "--config",
            &path,
            "--region",
            "eu-central-1",
            "--debug",
            "list-queues",
        ])
        .unwrap();
        let config = load_configuration(&cli).unwrap();

        assert_eq!(config.aws.region.as_deref(), Some("eu-central-1"));
        assert_eq!(config.consumer.max_messages_per_fetch, 2);
        assert!(config.consumer.debug);
        assert!(config.producer.debug);
    }

    #[test]
    fn test_invalid_endpoint_is_a_configuration_error() {
        let cli = Cli::try_parse_from([
            "sqs-courier",
            "--endpoint-url",
            "localhost:4566",
            "list-queues",
        ])
        .unwrap();

        let err = load_configuration(&cli).unwrap_err();
        assert!(matches!(err, CliError::Configuration(_)));
        assert_eq!(err.exit_code(), 1);
    }
}

// ============================================================================
// Exit Code Tests
// ============================================================================

mod exit_codes {
    use super::*;

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let transport = TransportError::new("SendMessage", "ServiceUnavailable", "down");

        assert_eq!(CliError::Queue(SqsError::Transport(transport.clone())).exit_code(), 2);
        assert_eq!(CliError::Queue(SqsError::EmptyMessageBody).exit_code(), 4);
        assert_eq!(
            CliError::ConsumerStopped(SqsError::FetchAttemptsExhausted {
                attempts: 3,
                last_error: transport,
            })
            .exit_code(),
            3
        );
        assert_eq!(
            CliError::Queue(SqsError::ClientInitialization {
                message: "no region".to_string()
            })
            .exit_code(),
            1
        );
        assert_eq!(
            CliError::Io(std::io::Error::other("closed")).exit_code(),
            5
        );
    }
}

// ============================================================================
// Command Execution Tests
// ============================================================================

mod commands {
    use super::*;

    #[tokio::test]
    async fn test_create_and_look_up_queue() {
        let (_, runner) = runner();
        let mut out = Vec::new();

        runner
            .run(command(&["create-queue", "orders", "--tag", "team=billing"]), &mut out)
            .await
            .unwrap();
        runner
            .run(command(&["queue-url", "orders"]), &mut out)
            .await
            .unwrap();

        let lines = output_lines(out);
        assert_eq!(lines[0]["queue_url"], queue_url_for("orders"));
        assert_eq!(lines[1]["queue_url"], queue_url_for("orders"));
    }

    /// Verify looking up an unknown queue surfaces the transport failure
    #[tokio::test]
    async fn test_unknown_queue_fails() {
        let (_, runner) = runner();
        let mut out = Vec::new();

        let err = runner
            .run(command(&["queue-url", "missing"]), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Queue(SqsError::Transport(_))));
        assert_eq!(err.exit_code(), 2);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_list_queues_with_prefix() {
        let (_, runner) = runner();
        let mut sink = Vec::new();
        for name in ["orders", "orders-dlq", "payments"] {
            runner
                .run(command(&["create-queue", name]), &mut sink)
                .await
                .unwrap();
        }

        let mut out = Vec::new();
        runner
            .run(command(&["list-queues", "--prefix", "orders"]), &mut out)
            .await
            .unwrap();

        let lines = output_lines(out);
        let mut urls: Vec<String> = serde_json::from_value(lines[0]["queue_urls"].clone()).unwrap();
        urls.sort();
        assert_eq!(urls, vec![queue_url_for("orders"), queue_url_for("orders-dlq")]);
    }

    #[tokio::test]
    async fn test_send_and_purge() {
        let (transport, runner) = runner();
        let url = queue_url_for("orders");
        let mut out = Vec::new();

        runner.run(command(&["create-queue", "orders"]), &mut out).await.unwrap();
        runner
            .run(command(&["send", &url, "hello", "-a", "tenant=acme"]), &mut out)
            .await
            .unwrap();
        assert_eq!(transport.message_count(&url), 1);

        runner.run(command(&["purge-queue", &url]), &mut out).await.unwrap();
        assert_eq!(transport.message_count(&url), 0);

        let lines = output_lines(out);
        assert!(lines[1]["message_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(lines[2]["purged"], url.as_str());
    }

    /// Verify an invalid trace header is rejected before anything is sent
    #[tokio::test]
    async fn test_send_rejects_bad_trace_header() {
        let (transport, runner) = runner();
        let url = queue_url_for("orders");
        let mut out = Vec::new();
        runner.run(command(&["create-queue", "orders"]), &mut out).await.unwrap();

        let err = runner
            .run(
                command(&["send", &url, "hello", "--trace-header", "Parent=xyz"]),
                &mut out,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Queue(SqsError::InvalidTraceHeader { .. })));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(transport.message_count(&url), 0);
    }

    /// Verify consume prints every message and stops after the requested count
    #[tokio::test(start_paused = true)]
    async fn test_consume_prints_messages() {
        let (transport, runner) = runner();
        let url = queue_url_for("orders");
        let mut sink = Vec::new();
        runner.run(command(&["create-queue", "orders"]), &mut sink).await.unwrap();
        runner
            .run(
                command(&["send", &url, r#"{"name":"a","count":3}"#, "-a", "tenant=acme"]),
                &mut sink,
            )
            .await
            .unwrap();
        runner
            .run(command(&["send", &url, "plain text"]), &mut sink)
            .await
            .unwrap();

        let mut out = Vec::new();
        runner
            .run(
                command(&["consume", &url, "--count", "2", "--auto-delete"]),
                &mut out,
            )
            .await
            .unwrap();

        let mut lines = output_lines(out);
        lines.sort_by_key(|line| line["body"].is_string());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["body"]["name"], "a");
        assert_eq!(lines[0]["body"]["count"], 3);
        assert_eq!(lines[0]["attributes"]["tenant"]["StringValue"], "acme");
        assert_eq!(lines[1]["body"], "plain text");
        assert_eq!(lines[1]["queue_url"], url.as_str());
        assert_eq!(transport.message_count(&url), 0);
    }

    /// Verify consume reports a consumer that gave up on fetching
    #[tokio::test(start_paused = true)]
    async fn test_consume_reports_fatal_stop() {
        let (transport, runner) = runner();
        let url = queue_url_for("orders");
        let mut sink = Vec::new();
        runner.run(command(&["create-queue", "orders"]), &mut sink).await.unwrap();
        transport.fail_all_fetches(true);

        let mut out = Vec::new();
        let err = runner
            .run(command(&["consume", &url]), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CliError::ConsumerStopped(SqsError::FetchAttemptsExhausted { attempts: 3, .. })
        ));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_consume_rejects_batch_size() {
        let (_, runner) = runner();
        let mut out = Vec::new();

        let err = runner
            .run(command(&["consume", "https://queue", "--max-messages", "11"]), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::InvalidArgument { .. }));
    }

    /// Verify a triggered shutdown stops an idle consume
    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_consume() {
        let (_, runner) = runner();
        let url = queue_url_for("orders");
        let mut sink = Vec::new();
        runner.run(command(&["create-queue", "orders"]), &mut sink).await.unwrap();

        let trigger = runner.shutdown_trigger();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.trigger();
        });

        let mut out = Vec::new();
        runner.run(command(&["consume", &url]), &mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
