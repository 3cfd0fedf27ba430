use dslab_consolidation::core::cluster::Cluster;
use dslab_consolidation::core::common::{Allocation, AllocationVerdict};
use dslab_consolidation::core::config::{ClusterConfig, PlacementKind, PlannerConfig};
use dslab_consolidation::core::error::Error;
use dslab_consolidation::core::overload::{predict_over_utilized, StaticThreshold};
use dslab_consolidation::core::power_model::LinearPowerModel;
use dslab_consolidation::core::snapshot::AllocationSnapshot;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn add_host(cluster: &mut Cluster, name: &str, cpu: u32, memory: u64) -> u32 {
    cluster.add_host(name, cpu, memory, 1000, Box::new(LinearPowerModel::new(100., 200.)))
}

#[test]
// Planner config is read from file, missing values are filled with defaults.
fn test_planner_config() {
    let config = PlannerConfig::from_file(&name_wrapper("planner.yaml")).unwrap();
    assert_eq!(config.overload_detector, "StaticThreshold[threshold=0.8]");
    assert_eq!(config.vm_selection, "MinimumUtilization");
    assert_eq!(config.placement, PlacementKind::BinPacking);
    assert_eq!(config.placement_threshold, 0.9);
    assert!(!config.sort_hosts);
    assert_eq!(config.swarm_threshold_overloaded, 5);
    assert_eq!(config.swarm_threshold_underloaded, 1000);
    assert_eq!(config.swarm.particles, 20);
    assert_eq!(config.swarm.seed, 42);
    assert_eq!(config.swarm.inertia, 0.95);

    let config = PlannerConfig::from_file(&name_wrapper("planner-default.yaml")).unwrap();
    assert_eq!(config, PlannerConfig::default());

    assert!(matches!(
        PlannerConfig::from_file(&name_wrapper("missing.yaml")),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_cluster_config() {
    let cluster = ClusterConfig::from_file(&name_wrapper("cluster.yaml"))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(cluster.get_host_count(), 3);
    assert_eq!(cluster.vms().count(), 5);

    let big = cluster.host_by_name("big").unwrap();
    assert_eq!(big.get_cpu_load(), 0.25);
    assert_eq!(big.get_total_bandwidth(), 140_000_000);
    assert_eq!(big.get_available_bandwidth(), 140_000_000 - 10);

    let small = cluster.host_by_name("small-1").unwrap();
    assert_eq!(small.vm_count(), 3);
    assert_eq!(small.get_cpu_load(), 1.2);
    assert_eq!(small.get_available_memory(), 4096 - 3 * 512);
    assert_eq!(cluster.host_by_name("small-2").unwrap().get_cpu_load(), 0.3);
}

#[test]
fn test_cluster_config_errors() {
    let config: ClusterConfig = serde_yaml::from_str(
        "hosts:\n  - name: h\n    cpus: 10\n    memory: 10\n    bandwidth: 10\n    power_model: Cubic\n",
    )
    .unwrap();
    assert!(matches!(config.build(), Err(Error::UnknownComponent(_))));

    let config: ClusterConfig = serde_yaml::from_str(
        "hosts:\n  - name: h\n    cpus: 10\n    memory: 10\n    bandwidth: 10\n    power_model: Linear\n\
         vms:\n  - host: x\n    cpu: 1\n    memory: 1\n",
    )
    .unwrap();
    assert!(config.build().is_err());
}

#[test]
// CPU can be overcommitted by VM creation, memory can not.
fn test_spawn_vm() {
    let mut cluster = Cluster::new();
    let h = add_host(&mut cluster, "h", 100, 100);
    cluster.spawn_vm(80, 40, 0, h).unwrap();
    cluster.spawn_vm(80, 40, 0, h).unwrap();
    assert_eq!(cluster.host(h).unwrap().get_cpu_load(), 1.6);
    assert_eq!(cluster.host(h).unwrap().get_available_cpu(), 0);
    assert!(matches!(
        cluster.spawn_vm(10, 40, 0, h),
        Err(Error::AllocationFailed { vm_id: 2, host_id: 0 })
    ));
    assert!(matches!(cluster.spawn_vm(10, 10, 0, 7), Err(Error::HostNotFound(7))));
    assert_eq!(cluster.vms().count(), 2);
}

#[test]
fn test_migration() {
    let mut cluster = Cluster::new();
    let h1 = add_host(&mut cluster, "h1", 100, 100);
    let h2 = add_host(&mut cluster, "h2", 100, 100);
    let vm = cluster.spawn_vm(30, 30, 0, h1).unwrap();

    assert_eq!(cluster.start_migration(vm, h2).unwrap(), AllocationVerdict::Success);
    assert!(cluster.vm(vm).unwrap().in_migration);
    assert!(cluster.host(h2).unwrap().is_migrating_in(vm));
    assert_eq!(cluster.vm_location(vm), Some(h1));
    assert!(cluster.migratable_vms(h1).is_empty());
    assert!(cluster.are_all_vms_migrating_out_or_any_vm_migrating_in(h1));
    assert!(cluster.are_all_vms_migrating_out_or_any_vm_migrating_in(h2));

    cluster.finish_migration(vm, h2).unwrap();
    assert!(!cluster.vm(vm).unwrap().in_migration);
    assert_eq!(cluster.vm_location(vm), Some(h2));
    assert!(cluster.host(h1).unwrap().is_switched_off());
    assert!(cluster.host(h2).unwrap().vms_migrating_in().is_empty());
}

#[test]
// Probing a placement leaves the host unchanged and gives the same answer every time.
fn test_probing_is_idempotent() {
    let mut cluster = Cluster::new();
    let h = add_host(&mut cluster, "h", 100, 100);
    cluster.spawn_vm(50, 50, 0, h).unwrap();
    let detector = StaticThreshold::new(0.8);
    let fits = Allocation {
        id: 10,
        cpu_usage: 20,
        memory_usage: 20,
        bandwidth_usage: 0,
    };
    let overloads = Allocation {
        id: 11,
        cpu_usage: 40,
        memory_usage: 20,
        bandwidth_usage: 0,
    };
    let no_memory = Allocation {
        id: 12,
        cpu_usage: 10,
        memory_usage: 60,
        bandwidth_usage: 0,
    };

    let host = cluster.host_mut(h).unwrap();
    for _ in 0..3 {
        assert!(!predict_over_utilized(host, &fits, &detector, None));
        assert!(predict_over_utilized(host, &overloads, &detector, None));
        assert!(!predict_over_utilized(host, &overloads, &detector, Some(1.)));
        assert!(predict_over_utilized(host, &no_memory, &detector, Some(1.)));
        assert_eq!(host.get_cpu_load(), 0.5);
        assert_eq!(host.get_available_memory(), 50);
        assert_eq!(host.vm_count(), 1);
    }
}

#[test]
// Restoring the snapshot brings back the mapping, VMs migrating in stay on their destination hosts.
fn test_snapshot_restore() {
    let mut cluster = Cluster::new();
    let h1 = add_host(&mut cluster, "h1", 100, 100);
    let h2 = add_host(&mut cluster, "h2", 100, 100);
    let h3 = add_host(&mut cluster, "h3", 100, 100);
    let vm1 = cluster.spawn_vm(30, 30, 0, h1).unwrap();
    let vm2 = cluster.spawn_vm(20, 20, 0, h1).unwrap();
    cluster.spawn_vm(40, 40, 0, h2).unwrap();
    cluster.start_migration(vm2, h3).unwrap();

    let placement = cluster.placement();
    let loads: Vec<f64> = cluster.hosts().map(|h| h.get_cpu_load()).collect();
    let snapshot = AllocationSnapshot::capture(&cluster);
    assert_eq!(snapshot.len(), 3);

    let alloc = cluster.vm(vm1).unwrap().allocation();
    cluster.host_mut(h1).unwrap().release(vm1);
    cluster.host_mut(h2).unwrap().allocate(&alloc);
    cluster.host_mut(h3).unwrap().release_all();

    snapshot.restore(&mut cluster).unwrap();
    assert_eq!(cluster.placement(), placement);
    assert_eq!(cluster.hosts().map(|h| h.get_cpu_load()).collect::<Vec<f64>>(), loads);
    assert!(cluster.host(h3).unwrap().is_migrating_in(vm2));
    assert_eq!(cluster.host(h2).unwrap().get_available_memory(), 60);
}

#[test]
fn test_snapshot_restore_failure() {
    let mut cluster = Cluster::new();
    let h = add_host(&mut cluster, "h", 100, 100);
    let other = add_host(&mut cluster, "other", 100, 100);
    let vm1 = cluster.spawn_vm(30, 60, 0, h).unwrap();
    let snapshot = AllocationSnapshot::capture(&cluster);

    // a VM migrating in takes the memory needed to restore vm1
    cluster.host_mut(h).unwrap().release(vm1);
    let vm2 = cluster.spawn_vm(30, 60, 0, other).unwrap();
    assert_eq!(cluster.start_migration(vm2, h).unwrap(), AllocationVerdict::Success);

    let err = snapshot.restore(&mut cluster).unwrap_err();
    assert!(matches!(err, Error::RestoreFailed { vm_id, host_id } if vm_id == vm1 && host_id == h));
    assert!(err.is_fatal());
}
