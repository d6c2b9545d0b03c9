//! RFC2348 option negotiation (`blksize`, `tsize`).

use crate::tftp::packet::ReadRequest;

pub const DEFAULT_BLKSIZE: u64 = 512;

#[derive(Debug, Clone)]
pub struct NegotiatedOptions {
    pub blksize: u64,
    pub tsize_requested: bool,
    pub echoed: Vec<(String, String)>,
}

/// Reads `blksize`/`tsize` out of a request's option list, building the
/// OACK echo list in request order (RFC2348 §3 requires the server only
/// echo options it actually recognized and applied).
pub fn negotiate(req: &ReadRequest, filesize: u64) -> NegotiatedOptions {
    let mut blksize = DEFAULT_BLKSIZE;
    let mut tsize_requested = false;
    let mut echoed = Vec::new();

    for (name, value) in &req.options {
        match name.to_ascii_lowercase().as_str() {
            "blksize" => {
                if let Ok(v) = value.parse::<u64>() {
                    blksize = v;
                    echoed.push(("blksize".to_string(), v.to_string()));
                }
            }
            "tsize" => {
                tsize_requested = true;
                echoed.push(("tsize".to_string(), filesize.to_string()));
            }
            _ => {}
        }
    }

    NegotiatedOptions { blksize, tsize_requested, echoed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_blksize_and_tsize() {
        let req = ReadRequest {
            filename: "x".to_string(),
            mode: "octet".to_string(),
            options: vec![("blksize".to_string(), "1468".to_string()), ("tsize".to_string(), "0".to_string())],
        };
        let negotiated = negotiate(&req, 9001);
        assert_eq!(negotiated.blksize, 1468);
        assert!(negotiated.tsize_requested);
        assert_eq!(negotiated.echoed, vec![("blksize".to_string(), "1468".to_string()), ("tsize".to_string(), "9001".to_string())]);
    }

    #[test]
    fn no_options_means_no_echo() {
        let req = ReadRequest { filename: "x".to_string(), mode: "octet".to_string(), options: vec![] };
        let negotiated = negotiate(&req, 10);
        assert_eq!(negotiated.blksize, DEFAULT_BLKSIZE);
        assert!(negotiated.echoed.is_empty());
    }
}
