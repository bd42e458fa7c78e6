use log::info;
use pmu_session::pmu::generic_event_names;
use pmu_session::{Catalog, Sysfs};

fn main() -> pmu_session::Result<()> {
    env_logger::init();

    // Optional regex restricting the catalog listing
    let pattern = std::env::args().nth(1);

    let mut catalog = Catalog::from_env()?;
    let n = catalog.load()?;
    info!("Loaded {} catalog events", n);
    match pattern {
        Some(p) => {
            for evt in catalog.find_by_name(&p)? {
                println!("{} -> {}", evt.name, evt.descriptor());
            }
        }
        None => {
            for (name, desc) in catalog.walk() {
                println!("{} -> {}", name, desc);
            }
        }
    }

    for evt in Sysfs::default().kernel_events()? {
        println!("{} -> {}", evt.name, evt.event);
    }
    for name in generic_event_names() {
        println!("{} [generic]", name);
    }
    Ok(())
}
