//! Process-wide, internally serialised NSS key-log sink shared across every
//! LGC and prober connection. Grounded in the `--keylog` / `KeyLogFile`
//! pattern used by quinn's `perf` client.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use rustls::KeyLog;

pub struct KeyLogWriter {
    file: Mutex<File>,
}

impl KeyLogWriter {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl KeyLog for KeyLogWriter {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let mut line = String::with_capacity(label.len() + client_random.len() * 2 + secret.len() * 2 + 2);
        line.push_str(label);
        line.push(' ');
        for b in client_random {
            line.push_str(&format!("{:02x}", b));
        }
        line.push(' ');
        for b in secret {
            line.push_str(&format!("{:02x}", b));
        }
        line.push('\n');

        if let Ok(mut f) = self.file.lock() {
            let _ = f.write_all(line.as_bytes());
            let _ = f.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn logs_lines_in_nss_keylog_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.log");
        let writer = KeyLogWriter::open(&path).unwrap();

        writer.log("CLIENT_HANDSHAKE_TRAFFIC_SECRET", &[1, 2, 3], &[4, 5, 6]);
        writer.log("CLIENT_TRAFFIC_SECRET_0", &[7, 8], &[9, 10]);

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();

        assert!(contents.contains("CLIENT_HANDSHAKE_TRAFFIC_SECRET 010203 040506"));
        assert!(contents.contains("CLIENT_TRAFFIC_SECRET_0 0708 090a"));
    }
}
