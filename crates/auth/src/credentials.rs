//! Zugangsdaten: Schluesselerzeugung, Benutzernamen, Basic-Auth
//!
//! Schluessel kommen ausschliesslich aus dem Zufallsgenerator des
//! Betriebssystems.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

/// Anzahl Zufallsbytes pro Schluessel
pub const SCHLUESSEL_BYTES: usize = 32;

/// Laenge eines Schluessels in Zeichen (URL-sicheres Base64 ohne Padding)
pub const SCHLUESSEL_LAENGE: usize = 43;

/// Erzeugt einen neuen Autorisierungsschluessel
pub fn schluessel_generieren() -> String {
    let mut bytes = [0u8; SCHLUESSEL_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Leitet aus dem Anzeigenamen eines Ladepunkts den Benutzernamen ab
///
/// Kleinbuchstaben und Ziffern bleiben erhalten, Umlaute werden
/// umschrieben, alles andere wird zu einem einzelnen `-` zusammengefasst.
/// Ergibt der Name keinen einzigen gueltigen Buchstaben, ist das Ergebnis
/// leer.
pub fn benutzername_ableiten(name: &str) -> String {
    let mut ergebnis = String::with_capacity(name.len());
    let mut trenner = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        let ersatz = match c {
            'ä' => Some("ae"),
            'ö' => Some("oe"),
            'ü' => Some("ue"),
            'ß' => Some("ss"),
            _ => None,
        };

        if let Some(e) = ersatz {
            if trenner && !ergebnis.is_empty() {
                ergebnis.push('-');
            }
            trenner = false;
            ergebnis.push_str(e);
        } else if c.is_ascii_alphanumeric() {
            if trenner && !ergebnis.is_empty() {
                ergebnis.push('-');
            }
            trenner = false;
            ergebnis.push(c);
        } else {
            trenner = true;
        }
    }

    ergebnis
}

/// Liest einen HTTP-Basic-Header (`Basic <base64(user:schluessel)>`)
///
/// Gibt `None` zurueck wenn das Schema nicht passt oder der Inhalt nicht
/// dekodierbar ist. Der Schluessel bleibt als Bytes erhalten.
pub fn basic_auth_lesen(header: &str) -> Option<(String, Vec<u8>)> {
    let (schema, rest) = header.trim().split_once(' ')?;
    if !schema.eq_ignore_ascii_case("basic") {
        return None;
    }

    let dekodiert = STANDARD.decode(rest.trim()).ok()?;
    let trenner = dekodiert.iter().position(|b| *b == b':')?;
    let benutzer = String::from_utf8(dekodiert[..trenner].to_vec()).ok()?;
    let schluessel = dekodiert[trenner + 1..].to_vec();
    Some((benutzer, schluessel))
}
