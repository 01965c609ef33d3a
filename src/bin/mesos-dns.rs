use mesos_dns::config::Conf;
use mesos_dns::resolver::{NoOpCoordinationService, Resolver};
use mesos_dns::shared::net::{start_servers, TcpParams, UdpParams};
use mesos_dns::shared::{log, logs};
use mesos_dns::store::Store;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() {
    let conf_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: mesos-dns <config-path>");
            process::exit(1);
        }
    };

    let conf = match Conf::from_file(&conf_path) {
        Ok(conf) => conf,
        Err(err) => {
            eprintln!("loading configuration: {}", err);
            process::exit(1);
        }
    };

    log::init_log(conf.log_level);
    logs::init_log();

    let conf = Arc::new(conf);
    let store = Arc::new(Store::new());
    let resolver = Arc::new(Resolver::new(Arc::clone(&conf), Arc::clone(&store)));

    // §6: the real coordination-service client is a separate collaborator;
    // the stub never invokes the leader-update callback, so the Resolver
    // relies solely on its fallback `masters` list.
    NoOpCoordinationService.start(Arc::clone(&resolver));

    resolver.listeners_bound();
    if let Err(err) = resolver.bootstrap() {
        log::error!("initial reload failed, starting degraded: {}", err);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let _reload_thread = Arc::clone(&resolver).spawn_periodic_reloads(Arc::clone(&shutdown));

    let udp_params = UdpParams {
        address: conf.udp_server.address.clone(),
        port: conf.udp_server.port,
        write_timeout: std::time::Duration::from_secs(conf.udp_server.write_timeout),
        threads: conf.udp_server.threads,
    };
    let tcp_params = TcpParams {
        address: conf.tcp_server.address.clone(),
        port: conf.tcp_server.port,
        read_timeout: std::time::Duration::from_secs(conf.tcp_server.read_timeout),
        write_timeout: std::time::Duration::from_secs(conf.tcp_server.write_timeout),
        threads: conf.tcp_server.threads,
    };

    // Blocks until both listeners exit; a fatal bind error is the only way
    // out of this call (§4.9: any state -> Terminated on fatal listener error).
    start_servers(Arc::clone(&resolver), udp_params, tcp_params);

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    resolver.terminate();
    process::exit(1);
}
