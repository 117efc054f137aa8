//! G.711 A-law Kompandierung
//!
//! ```text
//!    Linearer Eingang         Kompandiert
//!    ------------------------ -----------
//!    0000000wxyza             000wxyz
//!    0000001wxyza             001wxyz
//!    000001wxyzab             010wxyz
//!    00001wxyzabc             011wxyz
//!    0001wxyzabcd             100wxyz
//!    001wxyzabcde             101wxyz
//!    01wxyzabcdef             110wxyz
//!    1wxyzabcdefg             111wxyz
//! ```

/// Quantisierungs-Maske
const QUANT_MASK: i32 = 0x0F;

/// Shift fuer die Segmentnummer
const SEG_SHIFT: i32 = 4;

/// Segment-Maske
const SEG_MASK: i32 = 0x70;

/// Vorzeichen-Bit
const SIGN_BIT: i32 = 0x80;

/// Segment-Enden
const SEG_END: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

/// Wandelt ein 16-bit-PCM-Sample in ein A-law-Byte
pub fn linear2alaw(pcm_value: i16) -> u8 {
    let mut pcm = (pcm_value >> 3) as i32;

    let mask = if pcm >= 0 {
        0xD5 // Vorzeichen-Bit gesetzt
    } else {
        pcm = -pcm - 1;
        0x55
    };

    // Skalierte Magnitude in die Segmentnummer umsetzen
    let mut seg = 8;
    for (i, end) in SEG_END.iter().enumerate() {
        if pcm <= *end {
            seg = i as i32;
            break;
        }
    }

    // Ausserhalb des Wertebereichs: Maximalwert
    if seg >= 8 {
        return (0x7F ^ mask) as u8;
    }

    // Vorzeichen, Segment und Quantisierung kombinieren
    let mut aval = (seg << SEG_SHIFT) & 0xFF;
    if seg < 2 {
        aval |= (pcm >> 1) & QUANT_MASK;
    } else {
        aval |= (pcm >> seg) & QUANT_MASK;
    }

    ((aval ^ mask) & 0xFF) as u8
}

/// Wandelt ein A-law-Byte in ein 16-bit-PCM-Sample
pub fn alaw2linear(alaw_value: u8) -> i16 {
    let a_val = (alaw_value as i32) ^ 0x55;

    let mut t = (a_val & QUANT_MASK) << 4;
    let seg = (a_val & SEG_MASK) >> SEG_SHIFT;

    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }

    if (a_val & SIGN_BIT) != 0 {
        t as i16
    } else {
        (-t) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_und_vorzeichen() {
        // Null kodiert als positiver Kleinstwert und kommt nahe Null zurueck
        let code = linear2alaw(0);
        let zurueck = alaw2linear(code);
        assert!(zurueck.abs() <= 8, "Null-Dekodierung: {zurueck}");

        // Vorzeichen bleibt erhalten
        assert!(alaw2linear(linear2alaw(5000)) > 0);
        assert!(alaw2linear(linear2alaw(-5000)) < 0);
    }

    #[test]
    fn monotonie_auf_positiver_achse() {
        let mut letzter = alaw2linear(linear2alaw(0));
        for pcm in (0i16..30000).step_by(500) {
            let dec = alaw2linear(linear2alaw(pcm));
            assert!(dec >= letzter, "nicht monoton bei {pcm}");
            letzter = dec;
        }
    }

    #[test]
    fn rekonstruktion_liegt_im_segment() {
        for pcm in [-30000i16, -1234, -100, 100, 1234, 30000] {
            let dec = alaw2linear(linear2alaw(pcm)) as i32;
            let orig = pcm as i32;
            // Segmentquantisierung: relativer Fehler klein
            assert!(
                (orig - dec).abs() <= orig.abs() / 8 + 64,
                "{orig} -> {dec}"
            );
        }
    }

    #[test]
    fn dekodierung_ist_idempotent_ueber_code() {
        // Jeder Codewert dekodiert und re-kodiert auf sich selbst
        for code in 0u8..=255 {
            let dec = alaw2linear(code);
            let re = linear2alaw(dec);
            assert_eq!(re, code, "Code {code:#x}: {dec} -> {re:#x}");
        }
    }
}
