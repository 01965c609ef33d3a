use crate::config::Conf;
use crate::engine::handler::error_response;
use crate::shared::dns::{self, Header, Message, Question, RecordType, RespCode};
use crate::shared::log;
use crate::shared::net::Proto;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};

/// Max recursion depth following SOA-retarget delegations (§4.8).
const RECURSE_DEPTH: usize = 3;

/// Bounded recursive lookup against the configured upstream resolvers
/// (§4.8). The upstream exchange uses whichever transport the original
/// client used to reach us, matching the Go original's `proto := "udp"; if
/// ... TCPAddr { proto = "tcp" }` dispatch.
pub fn resolve(request: &Message, question: &Question, conf: &Conf, proto: Proto) -> Message {
    if !conf.external_on {
        return error_response(request, RespCode::Refused, conf.recurse_on);
    }

    for upstream in &conf.resolvers {
        if let Some(response) = recurse(upstream, question, conf, proto) {
            return retarget_response(request, response, conf.recurse_on);
        }
    }

    log::error!("[{}] no upstream resolver answered", request.id());
    error_response(request, RespCode::ServFail, conf.recurse_on)
}

/// Follows SOA-retarget delegations starting at `upstream`, up to
/// [`RECURSE_DEPTH`] hops. Stops on transport error, an authority-less
/// response, an authoritative non-empty answer, or a non-SOA first
/// authority record.
fn recurse(upstream: &str, question: &Question, conf: &Conf, proto: Proto) -> Option<Message> {
    let mut nameserver = upstream.to_string();
    let mut last = None;

    for _ in 0..RECURSE_DEPTH {
        let response = match exchange(&nameserver, question, conf, proto) {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!("external exchange with '{}' failed: {}", nameserver, err);
                return None;
            }
        };

        if response.authorities.is_empty() || (response.header.auth_answer && !response.answers.is_empty()) {
            return Some(response);
        }

        match response.authorities.first() {
            Some(dns::Record::SOA { ns_name, .. }) => {
                nameserver = ns_name.as_ref().trim_end_matches('.').to_string();
                last = Some(response);
            }
            _ => return Some(response),
        }
    }

    last
}

fn exchange(nameserver: &str, question: &Question, conf: &Conf, proto: Proto) -> std::io::Result<Message> {
    match proto {
        Proto::Udp => exchange_udp(nameserver, question, conf),
        Proto::Tcp => exchange_tcp(nameserver, question, conf),
    }
}

fn exchange_udp(nameserver: &str, question: &Question, conf: &Conf) -> std::io::Result<Message> {
    let bytes = encode_request(question)?;
    let timeout = conf.external_timeout();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_write_timeout(Some(timeout))?;
    socket.set_read_timeout(Some(timeout))?;
    socket.send_to(&bytes, (nameserver, 53))?;

    let mut buffer = [0_u8; 512];
    let (n_recv, _) = socket.recv_from(&mut buffer)?;
    decode_response(&buffer[..n_recv])
}

/// Mirrors the length-prefixed framing a TCP client request uses
/// (`shared::net::tcp_server`), but as the initiating side.
fn exchange_tcp(nameserver: &str, question: &Question, conf: &Conf) -> std::io::Result<Message> {
    let bytes = encode_request(question)?;
    let timeout = conf.external_timeout();

    let addr = (nameserver, 53)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "nameserver did not resolve to an address"))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let req_len = bytes.len() as u16;
    stream.write_all(&[(req_len >> 8) as u8, req_len as u8])?;
    stream.write_all(&bytes)?;

    let mut len_buf = [0_u8; 2];
    stream.read_exact(&mut len_buf)?;
    let resp_len = ((len_buf[0] as u16) << 8) | (len_buf[1] as u16);
    let mut resp_buf = vec![0_u8; resp_len as usize];
    stream.read_exact(&mut resp_buf)?;
    decode_response(&resp_buf)
}

fn encode_request(question: &Question) -> std::io::Result<Vec<u8>> {
    build_request(question)
        .encode_to_bytes()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{:?}", err)))
}

fn decode_response(bytes: &[u8]) -> std::io::Result<Message> {
    Message::decode_from_bytes(bytes).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{:?}", err)))
}

fn build_request(question: &Question) -> Message {
    let mut header = Header::default();
    header.questions_count = 1;
    Message {
        header,
        questions: vec![question.clone()],
        answers: vec![],
        authorities: vec![],
        additionals: vec![],
    }
}

/// Relays the upstream's answer/authority/additional sections back to the
/// original client, restamping the header fields the client actually cares
/// about (id, RA, section counts) rather than forwarding the upstream
/// header wholesale.
fn retarget_response(request: &Message, upstream: Message, recursion_available: bool) -> Message {
    let mut header = request.header.clone();
    header.query_resp = true;
    header.auth_answer = upstream.header.auth_answer;
    header.truncated = upstream.header.truncated;
    header.recursion_available = recursion_available;
    header.resp_code = upstream.header.resp_code;
    header.questions_count = request.questions.len() as u16;
    header.answers_count = upstream.answers.len() as u16;
    header.authorities_count = upstream.authorities.len() as u16;
    header.additionals_count = upstream.additionals.len() as u16;

    Message {
        header,
        questions: request.questions.clone(),
        answers: upstream.answers,
        authorities: upstream.authorities,
        additionals: upstream.additionals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TcpServerConf, UdpServerConf};
    use crate::shared::dns::{Class, Name};
    use crate::shared::log::LogLevel;

    fn sample_conf(external_on: bool) -> Conf {
        Conf {
            log_level: LogLevel::Info,
            domain: "mesos".to_string(),
            listener: "127.0.0.1".to_string(),
            port: 53,
            http_port: 8123,
            resolvers: vec!["240.0.0.1".to_string()],
            external_on,
            recurse_on: true,
            timeout: 1,
            ttl: 60,
            soa_mname: "ns1.mesos".to_string(),
            soa_rname: "root.ns1.mesos".to_string(),
            soa_refresh: 60,
            soa_retry: 600,
            soa_expire: 86400,
            masters: vec![],
            zk: String::new(),
            refresh_seconds: 60,
            udp_server: UdpServerConf {
                address: "0.0.0.0".to_string(),
                port: 53,
                write_timeout: 5,
                threads: 4,
            },
            tcp_server: TcpServerConf {
                address: "0.0.0.0".to_string(),
                port: 53,
                read_timeout: 5,
                write_timeout: 5,
                threads: 4,
            },
        }
    }

    fn sample_request() -> Message {
        let mut header = Header::default();
        header.questions_count = 1;
        Message {
            header,
            questions: vec![Question {
                node: Name::from_string("www.example.com.").unwrap(),
                record_type: RecordType::A,
                class: Class::IN,
            }],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        }
    }

    #[test]
    fn test_refused_when_external_disabled() {
        let conf = sample_conf(false);
        let request = sample_request();
        let response = resolve(&request, &request.questions[0], &conf, Proto::Udp);
        assert!(matches!(response.header.resp_code, RespCode::Refused));
    }

    #[test]
    fn test_servfail_when_no_upstream_reachable_udp() {
        // 240.0.0.0/4 is reserved ("future use") and unroutable, so the
        // exchange times out quickly without depending on live network access.
        let conf = sample_conf(true);
        let request = sample_request();
        let response = resolve(&request, &request.questions[0], &conf, Proto::Udp);
        assert!(matches!(response.header.resp_code, RespCode::ServFail));
    }

    #[test]
    fn test_servfail_when_no_upstream_reachable_tcp() {
        let conf = sample_conf(true);
        let request = sample_request();
        let response = resolve(&request, &request.questions[0], &conf, Proto::Tcp);
        assert!(matches!(response.header.resp_code, RespCode::ServFail));
    }
}
