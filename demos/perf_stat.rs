use log::{info, warn};
use pmu_session::{Catalog, PerfBackend, Resolver, Session, Sysfs};
use std::time::Duration;

fn main() -> pmu_session::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let expr = args
        .next()
        .unwrap_or_else(|| String::from("{cpu-cycles;instructions}"));
    let secs: u64 = match args.next() {
        Some(s) => s.parse()?,
        None => 1,
    };

    let sysfs = Sysfs::default();
    let mut catalog = match Catalog::from_env() {
        Ok(c) => c,
        Err(e) => {
            warn!("No event catalog, only raw and kernel events resolve - {}", e);
            Catalog::default()
        }
    };
    let mut resolver = Resolver::new(&mut catalog, &sysfs);

    let mut session = Session::with_sysfs(PerfBackend, &sysfs);
    session.parse(&expr, &mut resolver)?;
    session.open(true, -1)?;
    session.start()?;
    info!("Counting {} for {}s", expr, secs);
    std::thread::sleep(Duration::from_secs(secs));
    session.stop()?;

    for snap in session.collect() {
        println!("{:>20} {}", snap.sum, snap.name);
    }
    if let Some(ipc) = session.ipc() {
        for (cpu, v) in ipc.iter().enumerate() {
            println!("CPU{:<3} IPC {:.2}", cpu, v);
        }
    }

    session.close()
}
