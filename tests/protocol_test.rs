mod tests {
    use std::time::Duration;

    use filestore::client::coordinator::{self, Endpoint, TransferMode};
    use filestore::client::pipeline::TransferResult;
    use filestore::framing::{read_line, write_blank_line, write_line};
    use filestore::server;
    use tempfile::TempDir;
    use tokio::io::BufReader;
    use tokio::net::TcpStream;

    async fn spawn_server(served_dir: std::path::PathBuf) -> Endpoint {
        let listener = server::bind(0).await.expect("bind to ephemeral port");
        let addr = listener.local_addr().expect("local_addr");
        tokio::spawn(async move {
            let _ = server::accept_loop(listener, served_dir).await;
        });
        Endpoint {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        }
    }

    #[tokio::test]
    async fn round_trip_small_file_matches_spec_scenario() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        std::fs::write(served.path().join("hello.txt"), b"hello\n")?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let client_dir = TempDir::new()?;
        let reports = coordinator::get_files(
            &endpoint,
            vec!["hello.txt".to_string()],
            client_dir.path().to_path_buf(),
            TransferMode::Single,
            None,
        )
        .await?;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "hello.txt");
        assert!(matches!(reports[0].result, TransferResult::Downloaded));

        let downloaded = client_dir.path().join("hello.txt");
        assert!(downloaded.exists());
        assert!(!client_dir.path().join("hello.txt-part").exists());
        let bytes = std::fs::read(&downloaded)?;
        assert_eq!(bytes, b"hello\n");
        assert_eq!(filestore::checksum::digest_hex(&bytes), "b1946ac92492d2347c6235b4d2611184");

        Ok(())
    }

    #[tokio::test]
    async fn index_omits_dotfiles() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        std::fs::write(served.path().join("a"), b"")?;
        std::fs::write(served.path().join("b"), b"")?;
        std::fs::write(served.path().join(".hidden"), b"")?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let mut names = coordinator::get_index(&endpoint).await?;
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn pipelined_batch_downloads_all_files_in_order() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        std::fs::write(served.path().join("x"), vec![0x41u8; 1000])?;
        std::fs::write(served.path().join("y"), vec![0x42u8; 2000])?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let client_dir = TempDir::new()?;
        let reports = coordinator::get_files(
            &endpoint,
            vec!["x".to_string(), "y".to_string()],
            client_dir.path().to_path_buf(),
            TransferMode::Pipelined,
            None,
        )
        .await?;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| matches!(r.result, TransferResult::Downloaded)));
        assert_eq!(std::fs::read(client_dir.path().join("x"))?, vec![0x41u8; 1000]);
        assert_eq!(std::fs::read(client_dir.path().join("y"))?, vec![0x42u8; 2000]);

        Ok(())
    }

    #[tokio::test]
    async fn missing_file_reports_notfound_and_leaves_no_local_files() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let client_dir = TempDir::new()?;
        let reports = coordinator::get_files(
            &endpoint,
            vec!["nope".to_string()],
            client_dir.path().to_path_buf(),
            TransferMode::Single,
            None,
        )
        .await?;

        assert!(matches!(reports[0].result, TransferResult::NotFound));
        assert!(!client_dir.path().join("nope").exists());
        assert!(!client_dir.path().join("nope-part").exists());

        Ok(())
    }

    #[tokio::test]
    async fn put_round_trip_commits_file_with_no_part_remaining() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let client_dir = TempDir::new()?;
        let local = client_dir.path().join("upload.txt");
        std::fs::write(&local, b"uploaded contents\n")?;

        let reports = coordinator::put_files(
            &endpoint,
            vec![local],
            TransferMode::Single,
            None,
        )
        .await?;

        assert!(matches!(reports[0].result, TransferResult::Uploaded));
        let committed = served.path().join("upload.txt");
        assert!(committed.exists());
        assert!(!served.path().join("upload.txt-part").exists());
        assert_eq!(std::fs::read(committed)?, b"uploaded contents\n");

        Ok(())
    }

    /// Drives the wire directly to exercise a direction conflict within one
    /// persistent connection, per the spec's end-to-end scenario 4.
    #[tokio::test]
    async fn direction_conflict_yields_reqerr_then_recovers() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        std::fs::write(served.path().join("a"), b"A")?;
        std::fs::write(served.path().join("c"), b"C")?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let stream = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await??;
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);

        write_line(&mut wr, "GET", Some("a")).await?;
        write_line(&mut wr, "PUT", Some("b")).await?;

        let line = read_line(&mut reader).await?.expect("REQERR line");
        assert_eq!(line, "REQERR");

        write_line(&mut wr, "GET", Some("c")).await?;
        write_blank_line(&mut wr).await?;

        let ok_line = read_line(&mut reader).await?.expect("OK line");
        assert_eq!(ok_line, "OK c");

        Ok(())
    }

    #[tokio::test]
    async fn checksum_mismatch_on_put_yields_hasherr_and_no_leftover_part() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let stream = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await??;
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);

        write_line(&mut wr, "PUT", Some("bad.txt")).await?;
        write_line(&mut wr, "LENGTH", Some("5")).await?;
        write_blank_line(&mut wr).await?;
        use tokio::io::AsyncWriteExt;
        wr.write_all(b"abcde").await?;
        write_blank_line(&mut wr).await?;
        write_line(&mut wr, "CHECKSUM", Some("deadbeefdeadbeefdeadbeefdeadbeef")).await?;
        write_blank_line(&mut wr).await?;

        let line = read_line(&mut reader).await?.expect("HASHERR line");
        assert_eq!(line, "HASHERR bad.txt");

        assert!(!served.path().join("bad.txt").exists());
        assert!(!served.path().join("bad.txt-part").exists());

        Ok(())
    }

    #[tokio::test]
    async fn put_to_reserved_index_name_is_rejected() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let stream = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await??;
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);

        write_line(&mut wr, "PUT", Some("filelist.txt")).await?;
        write_line(&mut wr, "LENGTH", Some("3")).await?;
        write_blank_line(&mut wr).await?;

        let line = read_line(&mut reader).await?.expect("WRERR line");
        assert_eq!(line, "WRERR filelist.txt");
        assert!(!served.path().join("filelist.txt").exists());
        assert!(!served.path().join("filelist.txt-part").exists());

        Ok(())
    }

    #[tokio::test]
    async fn non_numeric_length_yields_reqerr_and_keeps_connection_open() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        std::fs::write(served.path().join("c"), b"C")?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let stream = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await??;
        let (rd, mut wr) = stream.into_split();
        let mut reader = BufReader::new(rd);

        write_line(&mut wr, "PUT", Some("bad.txt")).await?;
        write_line(&mut wr, "LENGTH", Some("not-a-number")).await?;

        let line = read_line(&mut reader).await?.expect("REQERR line");
        assert_eq!(line, "REQERR");

        write_line(&mut wr, "GET", Some("c")).await?;
        write_blank_line(&mut wr).await?;

        let ok_line = read_line(&mut reader).await?.expect("OK line");
        assert_eq!(ok_line, "OK c");

        Ok(())
    }

    #[tokio::test]
    async fn put_premature_disconnect_leaves_part_file_on_server() -> anyhow::Result<()> {
        let served = TempDir::new()?;
        let endpoint = spawn_server(served.path().to_path_buf()).await;

        let stream = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await??;
        let (_rd, mut wr) = stream.into_split();

        write_line(&mut wr, "PUT", Some("partial.txt")).await?;
        write_line(&mut wr, "LENGTH", Some("10")).await?;
        write_blank_line(&mut wr).await?;
        use tokio::io::AsyncWriteExt;
        wr.write_all(b"abc").await?;
        wr.shutdown().await?;
        drop(wr);

        // Give the server task a moment to observe the EOF and return.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(served.path().join("partial.txt-part").exists());
        assert!(!served.path().join("partial.txt").exists());

        Ok(())
    }
}
