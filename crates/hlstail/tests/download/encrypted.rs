use std::{sync::Arc, time::Duration};

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use hlstail::{
    decrypt::{Decrypter, DecrypterRegistry},
    HttpClient, TailDownloader, TailMerger, TailOptions, TailResult,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::download;
use crate::source::{body, concat, MockFetcher, Reply};

const KEY: [u8; 16] = *b"0123456789abcdef";
const IV: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

fn encrypt(plain: &[u8], iv: &[u8; 16]) -> Vec<u8> {
    encrypt_with(&KEY, plain, iv)
}

fn encrypt_with(key: &[u8; 16], plain: &[u8], iv: &[u8; 16]) -> Vec<u8> {
    cbc::Encryptor::<aes::Aes128>::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plain)
}

fn encrypted_chunk_list(key_line: &str, count: u64) -> String {
    let mut playlist = format!(
        "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:2
#EXT-X-MEDIA-SEQUENCE:0
{key_line}
"
    );
    for sequence in 0..count {
        playlist.push_str(&format!("#EXTINF:2.0,\n{sequence}.ts\n"));
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    playlist
}

async fn mount(server: &MockServer, mock_path: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(mock_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn aes128_stream_is_decrypted() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount(
        &server,
        "/live/index.m3u8",
        encrypted_chunk_list(
            "#EXT-X-KEY:METHOD=AES-128,URI=\"keys/stream.key\",IV=0x000102030405060708090a0b0c0d0e0f",
            3,
        )
        .into_bytes(),
    )
    .await;
    mount(&server, "/live/keys/stream.key", KEY.to_vec()).await;
    for sequence in 0..3 {
        mount(
            &server,
            &format!("/live/{sequence}.ts"),
            encrypt(&body(sequence), &IV),
        )
        .await;
    }

    let dir = tempfile::tempdir()?;
    let output = dir.path().join("output.ts");

    let mut downloader = TailDownloader::new(
        HttpClient::default(),
        format!("{}/live/index.m3u8", server.uri()).parse()?,
        TailOptions::default(),
    );
    let summary = downloader
        .download(TailMerger::concat(&output, false).await?)
        .await?;

    assert_eq!(summary.downloaded, 3);
    assert_eq!(std::fs::read(&output)?, concat(0..3));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_iv_means_zero_iv() -> anyhow::Result<()> {
    let fetcher = MockFetcher::new()
        .route(
            "/index.m3u8",
            [Reply::body(encrypted_chunk_list(
                "#EXT-X-KEY:METHOD=AES-128,URI=\"stream.key\"",
                2,
            ))],
        )
        .route("/stream.key", [Reply::body(KEY.to_vec())])
        .route("/0.ts", [Reply::body(encrypt(&body(0), &[0; 16]))])
        .route("/1.ts", [Reply::body(encrypt(&body(1), &[0; 16]))]);

    let outcome = download(fetcher, "/index.m3u8", TailOptions::default()).await?;
    outcome.result?;
    assert_eq!(outcome.output, concat(0..2));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn key_outage_is_retried_like_the_chunk_list() -> anyhow::Result<()> {
    let fetcher = Arc::new(
        MockFetcher::new()
            .route(
                "/index.m3u8",
                [Reply::body(encrypted_chunk_list(
                    "#EXT-X-KEY:METHOD=AES-128,URI=\"stream.key\"",
                    1,
                ))],
            )
            .route(
                "/stream.key",
                [Reply::Status(502), Reply::body(KEY.to_vec())],
            )
            .route("/0.ts", [Reply::body(encrypt(&body(0), &[0; 16]))]),
    );

    let outcome = download(fetcher.clone(), "/index.m3u8", TailOptions::default()).await?;
    outcome.result?;

    assert_eq!(outcome.output, concat(0..1));
    assert_eq!(fetcher.hits("/stream.key"), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn key_file_replaces_key_uri() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let key_file = dir.path().join("stream.key");
    std::fs::write(&key_file, KEY)?;

    let fetcher = Arc::new(
        MockFetcher::new()
            .route(
                "/index.m3u8",
                [Reply::body(encrypted_chunk_list(
                    "#EXT-X-KEY:METHOD=AES-128,URI=\"https://drm.example.com/key\"",
                    1,
                ))],
            )
            .route("/0.ts", [Reply::body(encrypt(&body(0), &[0; 16]))]),
    );

    let options = TailOptions::default().with_key_file(Some(key_file));
    let outcome = download(fetcher.clone(), "/index.m3u8", options).await?;
    outcome.result?;

    assert_eq!(outcome.output, concat(0..1));
    assert_eq!(fetcher.hits("/key"), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rotated_key_applies_to_its_generation() -> anyhow::Result<()> {
    const ROTATED: [u8; 16] = *b"fedcba9876543210";

    let generation = |media_sequence: u64, key: &str, end: bool| {
        let mut playlist = format!(
            "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:2
#EXT-X-MEDIA-SEQUENCE:{media_sequence}
#EXT-X-KEY:METHOD=AES-128,URI=\"{key}\"
"
        );
        for sequence in media_sequence..media_sequence + 2 {
            playlist.push_str(&format!("#EXTINF:2.0,\n{sequence}.ts\n"));
        }
        if end {
            playlist.push_str("#EXT-X-ENDLIST\n");
        }
        Reply::body(playlist)
    };

    let fetcher = Arc::new(
        MockFetcher::new()
            // the first reply is taken by manifest resolution
            .route(
                "/index.m3u8",
                [
                    generation(0, "k1.key", false),
                    generation(0, "k1.key", false),
                    generation(2, "k2.key", true),
                ],
            )
            .route("/k1.key", [Reply::body(KEY.to_vec())])
            .route("/k2.key", [Reply::body(ROTATED.to_vec())])
            .route("/0.ts", [Reply::body(encrypt(&body(0), &[0; 16]))])
            .route("/1.ts", [Reply::body(encrypt(&body(1), &[0; 16]))])
            .route("/2.ts", [Reply::body(encrypt_with(&ROTATED, &body(2), &[0; 16]))])
            .route("/3.ts", [Reply::body(encrypt_with(&ROTATED, &body(3), &[0; 16]))]),
    );

    let outcome = download(fetcher.clone(), "/index.m3u8", TailOptions::default()).await?;
    let summary = outcome.result?;

    assert_eq!(summary.downloaded, 4);
    assert!(summary.failed_sequences.is_empty());
    assert_eq!(outcome.output, concat(0..4));
    assert_eq!(fetcher.hits("/k2.key"), 1);

    Ok(())
}

struct Xor;

impl Decrypter for Xor {
    fn decrypt(&self, key: &[u8], _iv: &[u8; 16], data: &[u8]) -> TailResult<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ key[0]).collect())
    }
}

#[tokio::test(start_paused = true)]
async fn registered_method_is_used() -> anyhow::Result<()> {
    let xor = |data: &[u8]| data.iter().map(|b| b ^ 0x5a).collect::<Vec<_>>();
    let fetcher = MockFetcher::new()
        .route(
            "/index.m3u8",
            [Reply::body(encrypted_chunk_list(
                "#EXT-X-KEY:METHOD=X-XOR,URI=\"stream.key\"",
                2,
            ))],
        )
        .route("/stream.key", [Reply::body(vec![0x5a])])
        .route("/0.ts", [Reply::body(xor(&body(0)))])
        .route("/1.ts", [Reply::body(xor(&body(1)))]);

    let dir = tempfile::tempdir()?;
    let output = dir.path().join("output.ts");
    let mut downloader = TailDownloader::new(
        fetcher,
        crate::source::url("/index.m3u8"),
        TailOptions::default().with_segment_timeout(Duration::from_secs(1)),
    )
    .with_registry(DecrypterRegistry::default().with("X-XOR", Xor));
    downloader
        .download(TailMerger::concat(&output, false).await?)
        .await?;

    assert_eq!(std::fs::read(&output)?, concat(0..2));

    Ok(())
}
