//! Decodes the scamper JSON written by `fast-mda-traceroute`. The output is one JSON document
//! per line, of which exactly one is the `tracelb` record holding the discovered hops.
use serde::Deserialize;
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum DecodeError {
    /// The probe printed nothing
    Empty,

    /// A line is not JSON
    InvalidJson(serde_json::Error),

    /// The `tracelb` record doesn't have the expected shape
    InvalidRecord(serde_json::Error),

    /// Number of `tracelb` records found, when it isn't exactly one
    TracelbCount(usize),

    /// The record lists no nodes, usually because the wait budget was too low
    MissingNodes,

    MissingField(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DecodeError::Empty => write!(f, "parsed data is empty"),
            DecodeError::InvalidJson(ref e) => write!(f, "output line is not json: {}", e),
            DecodeError::InvalidRecord(ref e) => write!(f, "malformed tracelb record: {}", e),
            DecodeError::TracelbCount(n) => {
                write!(f, "expected exactly one tracelb item, found {}", n)
            }
            DecodeError::MissingNodes => {
                write!(f, "tracelb item is missing nodes (wait argument may be too low)")
            }
            DecodeError::MissingField(key) => write!(f, "tracelb item is missing {}", key),
        }
    }
}

impl error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            DecodeError::InvalidJson(ref e) | DecodeError::InvalidRecord(ref e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug)]
struct Tracelb {
    dst: Option<String>,
    nodec: Option<u64>,
    method: Option<String>,
    nodes: Option<Vec<Node>>,
}

#[derive(Deserialize, Debug)]
struct Node {
    addr: Option<String>,
    #[serde(default)]
    links: Vec<Vec<Link>>,
}

#[derive(Deserialize, Debug)]
struct Link {
    addr: Option<String>,
    #[serde(default)]
    probes: Vec<Probe>,
}

#[derive(Deserialize, Debug)]
struct Probe {
    #[serde(default)]
    replies: Vec<Reply>,
}

#[derive(Deserialize, Debug)]
struct Reply {
    rtt: Option<f64>,
}

impl Node {
    fn last_link(&self) -> Option<&Link> {
        self.links.last().and_then(|l| l.last())
    }

    /// Address of the hop this node leads to, or the node itself when it has no links
    fn hop(&self) -> Option<&str> {
        self.last_link()
            .and_then(|l| l.addr.as_deref())
            .or(self.addr.as_deref())
    }

    /// Only the last reply of the last probe counts
    fn rtt(&self) -> Option<f64> {
        self.last_link()
            .and_then(|l| l.probes.last())
            .and_then(|p| p.replies.last())
            .and_then(|r| r.rtt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TracerouteResult {
    pub destination: String,

    /// Node count reported by the probe. Not necessarily the number of `hops`.
    pub hops_count: u64,
    pub method: String,
    pub hops: Vec<String>,

    /// Round trip times in milliseconds. A hop without an answer has no entry here, so this
    /// can be shorter than `hops`.
    pub hop_rtts: Vec<f64>,
}

impl TracerouteResult {
    /// Sum of all hop round trip times, rounded to two decimal places
    pub fn total_rtt(&self) -> f64 {
        let total: f64 = self.hop_rtts.iter().sum();
        (total * 100.0).round_ties_even() / 100.0
    }
}

/// Non-blank lines of `data`
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut start = 0;
    memchr::memchr_iter(b'\n', data)
        .chain(std::iter::once(data.len()))
        .filter_map(move |end| {
            let line = data[start..end].trim_ascii();
            start = end + 1;
            if line.is_empty() {
                None
            } else {
                Some(line)
            }
        })
}

pub fn parse_output(data: &[u8]) -> Result<TracerouteResult, DecodeError> {
    let mut documents = Vec::new();
    for line in lines(data) {
        let doc: serde_json::Value =
            serde_json::from_slice(line).map_err(DecodeError::InvalidJson)?;
        documents.push(doc);
    }

    if documents.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut records: Vec<serde_json::Value> = documents
        .into_iter()
        .filter(|doc| doc.get("type").and_then(|t| t.as_str()) == Some("tracelb"))
        .collect();

    if records.len() != 1 {
        return Err(DecodeError::TracelbCount(records.len()));
    }

    let record: Tracelb = match records.pop() {
        Some(doc) => serde_json::from_value(doc).map_err(DecodeError::InvalidRecord)?,
        None => return Err(DecodeError::TracelbCount(0)),
    };

    let nodes = match record.nodes {
        Some(ref nodes) if !nodes.is_empty() => nodes,
        _ => return Err(DecodeError::MissingNodes),
    };

    let mut hops = Vec::with_capacity(nodes.len());
    let mut hop_rtts = Vec::with_capacity(nodes.len());
    for node in nodes {
        let hop = match node.hop() {
            Some(hop) => hop,
            None => {
                log::debug!("skipping node without an address");
                continue;
            }
        };

        hops.push(hop.to_owned());
        match node.rtt() {
            Some(rtt) => hop_rtts.push(rtt),
            None => log::debug!("no round trip time recorded for hop {}", hop),
        }
    }

    Ok(TracerouteResult {
        destination: record.dst.ok_or(DecodeError::MissingField("dst"))?,
        hops_count: record.nodec.ok_or(DecodeError::MissingField("nodec"))?,
        method: record.method.ok_or(DecodeError::MissingField("method"))?,
        hops,
        hop_rtts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracelb(nodes: &str) -> String {
        format!(
            r#"{{"type":"tracelb","method":"icmp-echo","dst":"8.8.8.8","nodec":2,"nodes":{}}}"#,
            nodes
        )
    }

    #[test]
    fn test_lines_skip_blanks() {
        let data = b"a\n\n  \r\nb\r\nc";
        let actual: Vec<&[u8]> = lines(data).collect();
        assert_eq!(actual, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
    }

    #[test]
    fn test_parse_single_record() {
        let nodes = r#"[
            {"addr":"10.0.0.1","links":[[{"addr":"10.0.0.2","probes":[{"replies":[{"rtt":1.5},{"rtt":2.25}]}]}]]},
            {"addr":"10.0.0.2","links":[[{"addr":"8.8.8.8","probes":[{"replies":[{"rtt":7.0}]}]}]]}
        ]"#
        .replace('\n', "");
        let result = parse_output(tracelb(&nodes).as_bytes()).unwrap();
        assert_eq!(
            result,
            TracerouteResult {
                destination: String::from("8.8.8.8"),
                hops_count: 2,
                method: String::from("icmp-echo"),
                hops: vec![String::from("10.0.0.2"), String::from("8.8.8.8")],
                hop_rtts: vec![2.25, 7.0],
            }
        );
        assert_eq!(result.total_rtt(), 9.25);
    }

    #[test]
    fn test_missing_rtt_keeps_hop() {
        let nodes = r#"[{"addr":"10.0.0.1","links":[[{"addr":"10.0.0.2","probes":[]}]]},{"addr":"8.8.8.8"}]"#;
        let result = parse_output(tracelb(nodes).as_bytes()).unwrap();
        assert_eq!(result.hops, vec![String::from("10.0.0.2"), String::from("8.8.8.8")]);
        assert!(result.hop_rtts.is_empty());
        assert_eq!(result.total_rtt(), 0.0);
    }

    #[test]
    fn test_total_rtt_ties_to_even() {
        let result = TracerouteResult {
            destination: String::from("1.1.1.1"),
            hops_count: 2,
            method: String::from("icmp-echo"),
            hops: vec![String::from("10.0.0.1"), String::from("1.1.1.1")],
            hop_rtts: vec![0.125, 0.5],
        };
        assert_eq!(result.total_rtt(), 0.62);
    }

    #[test]
    fn test_node_without_address_is_skipped() {
        let nodes = r#"[{"q_ttl":1},{"addr":"8.8.8.8"}]"#;
        let result = parse_output(tracelb(nodes).as_bytes()).unwrap();
        assert_eq!(result.hops, vec![String::from("8.8.8.8")]);
    }

    #[test]
    fn test_empty_output() {
        assert!(matches!(parse_output(b""), Err(DecodeError::Empty)));
        assert!(matches!(parse_output(b"\n \n"), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_invalid_json() {
        let res = parse_output(b"docker: Error response from daemon\n");
        assert!(matches!(res, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_tracelb_count() {
        let res = parse_output(br#"{"type":"cycle-start"}"#);
        assert!(matches!(res, Err(DecodeError::TracelbCount(0))));

        let nodes = r#"[{"addr":"8.8.8.8"}]"#;
        let twice = format!("{}\n{}", tracelb(nodes), tracelb(nodes));
        let res = parse_output(twice.as_bytes());
        assert!(matches!(res, Err(DecodeError::TracelbCount(2))));
    }

    #[test]
    fn test_missing_nodes() {
        let res = parse_output(tracelb("[]").as_bytes());
        assert!(matches!(res, Err(DecodeError::MissingNodes)));

        let res = parse_output(br#"{"type":"tracelb","dst":"8.8.8.8","nodec":0}"#);
        assert!(matches!(res, Err(DecodeError::MissingNodes)));

        let res = parse_output(tracelb("null").as_bytes());
        assert!(matches!(res, Err(DecodeError::MissingNodes)));
    }

    #[test]
    fn test_missing_method() {
        let res = parse_output(br#"{"type":"tracelb","dst":"8.8.8.8","nodec":1,"nodes":[{"addr":"8.8.8.8"}]}"#);
        assert!(matches!(res, Err(DecodeError::MissingField("method"))));
    }

    #[test]
    fn test_malformed_record() {
        let res = parse_output(br#"{"type":"tracelb","nodes":"none"}"#);
        assert!(matches!(res, Err(DecodeError::InvalidRecord(_))));
    }
}
