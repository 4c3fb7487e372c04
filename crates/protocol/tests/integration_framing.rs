//! Integration-Tests fuer das Frame-Format ueber einen echten Byte-Stream

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use fluesterpost_protocol::wire::{read_frame, write_frame};
use fluesterpost_protocol::{FrameCodec, FramingError, DEFAULT_MAX_FRAME_SIZE};

fn bild(groesse: usize) -> Vec<u8> {
    (0..groesse).map(|i| (i * 31 % 256) as u8).collect()
}

#[tokio::test]
async fn fuenf_mb_in_4kb_bloecken() {
    // Duplex-Puffer von 4 KiB erzwingt Teil-Lese- und Schreibvorgaenge
    let (client, server) = tokio::io::duplex(4096);
    let payload = bild(5 * 1024 * 1024);
    let erwartet = payload.clone();

    let sender = tokio::spawn(async move {
        let mut client = client;
        write_frame(&mut client, &payload, DEFAULT_MAX_FRAME_SIZE)
            .await
            .expect("Senden fehlgeschlagen");
    });

    let mut frames = FramedRead::new(server, FrameCodec::new());
    let empfangen = frames
        .next()
        .await
        .expect("Stream endete vorzeitig")
        .expect("Frame fehlerhaft");

    sender.await.unwrap();
    assert_eq!(empfangen.len(), 5 * 1024 * 1024);
    assert_eq!(&empfangen[..], &erwartet[..]);
}

#[tokio::test]
async fn reihenfolge_bleibt_erhalten() {
    let (client, server) = tokio::io::duplex(512);

    let sender = tokio::spawn(async move {
        let mut sink = FramedWrite::new(client, FrameCodec::new());
        for i in 0..50u32 {
            sink.send(Bytes::from(format!("nachricht-{i}"))).await.unwrap();
        }
    });

    let mut frames = FramedRead::new(server, FrameCodec::new());
    for i in 0..50u32 {
        let frame = frames.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], format!("nachricht-{i}").as_bytes());
    }
    sender.await.unwrap();
}

#[tokio::test]
async fn zu_grosse_laenge_beendet_stream() {
    let (mut client, server) = tokio::io::duplex(64);

    // Laengen-Feld kuendigt 1 GiB an, Limit ist 1 MiB
    client.write_all(&(1u32 << 30).to_be_bytes()).await.unwrap();

    let mut frames = FramedRead::new(server, FrameCodec::with_max_size(1024 * 1024));
    let ergebnis = frames.next().await.expect("Fehler erwartet");
    assert!(matches!(ergebnis, Err(FramingError::FrameZuGross { .. })));
}

#[tokio::test]
async fn read_frame_ueber_duplex() {
    let (mut client, mut server) = tokio::io::duplex(16);

    let sender = tokio::spawn(async move {
        write_frame(&mut client, b"hallo ueber einen kleinen puffer", 1024)
            .await
            .unwrap();
    });

    let frame = read_frame(&mut server, 1024).await.unwrap();
    assert_eq!(frame, b"hallo ueber einen kleinen puffer");
    sender.await.unwrap();
}
