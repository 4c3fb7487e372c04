//! Wire-Format fuer P2P-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Die maximale Frame-Groesse ist konfigurierbar (Standard: 100 MiB). Eine
//! groessere angekuendigte Laenge ist ein `FramingError` – es wird weder
//! Speicher dafuer reserviert noch weitergelesen.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FramingError;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (100 MiB – ein Foto kann mehrere MB haben)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Blockgroesse beim Schreiben grosser Frames (64 KiB)
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer laengenpraefixierte P2P-Frames
///
/// Transportiert rohe Bytes; was im Payload steckt (Handshake-JSON,
/// verschluesselter Envelope) interessiert den Codec nicht.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::FramedRead;
/// use fluesterpost_protocol::wire::FrameCodec;
///
/// // let (lesen, _schreiben) = stream.into_split();
/// // let frames = FramedRead::new(lesen, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Payload-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Prueft eine angekuendigte Laenge gegen das Limit
fn laenge_pruefen(length: usize, max_frame_size: usize) -> Result<(), FramingError> {
    if length > max_frame_size {
        return Err(FramingError::FrameZuGross {
            laenge: length,
            maximum: max_frame_size,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen (big-endian u32) ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        // Vor jeder Reservierung pruefen
        laenge_pruefen(length, self.max_frame_size)?;

        // Pruefen ob der vollstaendige Frame bereits im Buffer ist
        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        // Laengen-Feld verbrauchen
        src.advance(LENGTH_FIELD_SIZE);

        // Payload-Bytes extrahieren
        Ok(Some(src.split_to(length)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<Bytes> for FrameCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(FramingError::NachrichtZuGross {
                laenge: item.len(),
                maximum: self.max_frame_size,
            });
        }

        // Laengen-Feld + Payload schreiben
        dst.reserve(LENGTH_FIELD_SIZE + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reassembler
// ---------------------------------------------------------------------------

/// Setzt Frames aus beliebig zerstueckelten Byte-Bloecken zusammen
///
/// Synchrones Gegenstueck zu `FramedRead`: jeder `push` nimmt so viele Bytes
/// wie gerade vorliegen und liefert alle dadurch vollstaendig gewordenen
/// Payloads zurueck.
#[derive(Debug, Default)]
pub struct Reassembler {
    codec: FrameCodec,
    puffer: BytesMut,
}

impl Reassembler {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            codec: FrameCodec::with_max_size(max_frame_size),
            puffer: BytesMut::new(),
        }
    }

    /// Fuegt einen Block hinzu und gibt alle fertigen Payloads zurueck
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        self.puffer.extend_from_slice(chunk);

        let mut fertig = Vec::new();
        while let Some(frame) = self.codec.decode(&mut self.puffer)? {
            fertig.push(frame.freeze());
        }
        Ok(fertig)
    }

    /// Anzahl der noch unvollstaendig gepufferten Bytes
    pub fn gepuffert(&self) -> usize {
        self.puffer.len()
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `Geschlossen` wenn die Gegenseite vor dem ersten Laengen-Byte trennt
/// - `FrameZuGross` wenn die angekuendigte Laenge das Limit ueberschreitet
/// - `Io` (UnexpectedEof) wenn die Verbindung mitten im Frame abbricht
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Vec<u8>, FramingError>
where
    R: AsyncRead + Unpin,
{
    // Laengen-Feld lesen
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::Geschlossen);
        }
        Err(e) => return Err(e.into()),
    }
    let length = u32::from_be_bytes(len_buf) as usize;

    // Groesse pruefen, bevor Speicher angefordert wird
    laenge_pruefen(length, max_frame_size)?;

    // Payload lesen – read_exact schleift ueber Teil-Lesevorgaenge
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(payload)
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
///
/// Grosse Payloads werden in `WRITE_CHUNK_SIZE`-Bloecken geschrieben.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_frame_size {
        return Err(FramingError::NachrichtZuGross {
            laenge: payload.len(),
            maximum: max_frame_size,
        });
    }

    let len_bytes = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len_bytes).await?;
    for block in payload.chunks(WRITE_CHUNK_SIZE) {
        writer.write_all(block).await?;
    }
    writer.flush().await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
