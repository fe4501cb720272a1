use acmi_render_mirror::{IconSet, IconShape, LockPair, MirrorOptions, Pipeline};
use acmi_telemetry::analyzer::world::WorldStateView;
use acmi_telemetry::classification::ObjectClass;
use acmi_telemetry::feed::{LineQueue, split_lines, spawn_file_reader};
use acmi_telemetry::types::{ObjectId, WorldPos};

const RECORDING: &str = "\u{feff}FileType=text/acmi/tacview\r
FileVersion=2.2\r
0,ReferenceTime=2011-06-02T05:00:00Z\r
0,Title=Intercept\r
// bullseye and a pair of fighters\r
#0.00\r
40000001,T=0|0|0|0|0|0|0|0|0,Type=Navaid+Static+Bullseye,Coalition=Allies\r
9341,T=6.85|7.27|4572.13|-4.2|3.5|-161.8|701491.99|679328.81|-155.7,Health=1.00,Type=Air+FixedWing,Name=F-16C,Pilot=Viper,Color=Blue,Coalition=Allies,CAS=250\r
9342,T=6.90|7.30|4000|0|0|0|705000|679328.81|90,Type=Air+FixedWing,Name=MiG-29,Color=Red,Coalition=Enemies,CAS=230\r
500,T=6.9|7.3|0|710000|680000,Type=Sea+Watercraft+AircraftCarrier,Color=Red\r
#1.50\r
9341,T=|||||||679400.00|,LockedTarget=9342\r
9342,LockedTarget=9341\r
#2.00\r
501,T=6.9|7.3|4000|705100|679400,Type=Weapon+Missile,Color=Blue\r
501,Name=AIM-120\\, radar guided\r
#3.25\r
-9342\r
#4.00\r
9341,T=|7.28|||\r
";

fn replay(pipeline: &mut Pipeline, text: &str) {
    for line in split_lines(text) {
        if line.starts_with('#') && !pipeline.queue().is_empty() {
            pipeline.tick();
            pipeline.mirror().assert_invariants();
        }
        pipeline.push_line(line);
    }
    pipeline.tick();
    pipeline.mirror().assert_invariants();
}

#[test]
fn recorded_snippet_end_to_end() {
    let mut pipeline = Pipeline::default();
    replay(&mut pipeline, RECORDING);
    let world = pipeline.world();

    assert!(world.is_consistent());
    assert_eq!(world.global("Title"), Some("Intercept"));
    assert_eq!(world.entities_of(ObjectClass::FixedWing).count(), 1);
    assert_eq!(world.entities_of(ObjectClass::Missile).count(), 1);

    let viper = world.entity("9341").unwrap();
    assert_eq!(viper.orientation.altitude, 4572.13);
    assert_eq!(viper.orientation.heading, -155.7);
    assert_eq!(viper.orientation.u, 701491.99);
    assert_eq!(viper.orientation.v, 679400.0);
    assert_eq!(viper.orientation.latitude, 7.28);
    assert_eq!(viper.flight.health, 1.0);
    // Its lock target went away.
    assert!(viper.locked_targets().is_empty());

    let missile = world.entity("501").unwrap();
    assert_eq!(missile.labels.name, "AIM-120, radar guided");

    let decoder = world.decoder();
    assert_eq!(decoder.relative_time(), 4.0);
    assert!(decoder.stats().ignored >= 3);
    assert_eq!(
        WorldStateView::clock(world).to_rfc3339(),
        "2011-06-02T05:00:04+00:00"
    );

    let mirror = pipeline.mirror();
    assert_eq!(mirror.icon_shape_of("9341"), Some(IconShape::Square));
    assert_eq!(mirror.icon_shape_of("500"), Some(IconShape::Ship));
    assert_eq!(mirror.icon_shape_of("501"), Some(IconShape::Diamond));
    assert_eq!(mirror.icon_shape_of("9342"), None);
    assert_eq!(mirror.icon_shape_of("40000001"), None);
    assert!(mirror.velocity_vectors().contains("9341"));
    assert_eq!(mirror.velocity_vectors().len(), 1);
    assert!(mirror.lock_lines().is_empty());
}

#[test]
fn lock_lines_exist_while_both_ends_live() {
    let mut pipeline = Pipeline::default();
    let cut = RECORDING.find("#2.00").unwrap();
    replay(&mut pipeline, &RECORDING[..cut]);

    let lines = pipeline.mirror().lock_lines();
    assert_eq!(lines.len(), 2);
    let forward = LockPair::new(ObjectId::from("9341"), ObjectId::from("9342"));
    let line = lines.get(&forward).unwrap();
    assert_eq!(line.start, [701491.99_f64 as f32, 679400.0]);
    assert_eq!(line.end, [705000.0, 679328.81_f64 as f32]);

    replay(&mut pipeline, "-9341");
    assert!(pipeline.mirror().lock_lines().is_empty());
    assert!(!pipeline.mirror().velocity_vectors().contains("9341"));
}

#[test]
fn swap_remove_keeps_batches_dense() {
    let mut pipeline = Pipeline::default();
    replay(
        &mut pipeline,
        "A,T=1|2|0|10|10,Type=Ground+Vehicle\nB,T=1|2|0|20|20,Type=Ground+Vehicle\nC,T=1|2|0|30|30,Type=Ground+Vehicle",
    );
    replay(&mut pipeline, "-B");

    let batch = pipeline.mirror().icons(IconShape::Circle).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.active_view().len(), 2);
    assert_eq!(batch.index_of("A"), Some(0));
    assert_eq!(batch.index_of("C"), Some(1));
    assert_eq!(batch.active_view()[1].position, [30.0, 30.0]);
    assert_eq!(batch.id_at(2), None);
    assert_eq!(batch.as_bytes().len(), 2 * 32);
}

#[test]
fn queries_use_world_and_mirror() {
    let mut pipeline = Pipeline::default();
    replay(&mut pipeline, RECORDING);

    let hit = pipeline.nearest(WorldPos::new(705090.0, 679400.0), 50.0);
    assert_eq!(hit.map(|e| e.id().as_str()), Some("501"));
    assert!(pipeline.nearest(WorldPos::new(0.0, 1.0e7), 50.0).is_none());

    // Bullseye sits at the origin.
    let (bearing, range) = pipeline.bullseye_relative(WorldPos::new(0.0, 1852.0 * 10.0));
    assert!(bearing.abs() < 1e-9);
    assert!((range - 10.0).abs() < 1e-9);
}

#[test]
fn ntds_options_rebuild_the_mirror() {
    let mut pipeline = Pipeline::default();
    replay(&mut pipeline, RECORDING);
    pipeline.set_options(MirrorOptions {
        icon_set: IconSet::Ntds,
        ..MirrorOptions::default()
    });
    let mirror = pipeline.mirror();
    mirror.assert_invariants();
    assert_eq!(mirror.icon_shape_of("40000001"), Some(IconShape::Circle));
    assert_eq!(mirror.icon_count(), 4);
}

#[test]
fn file_reader_feeds_the_queue() {
    let path = std::env::temp_dir().join(format!("acmi_mirror_{}.txt.acmi", std::process::id()));
    std::fs::write(&path, RECORDING).unwrap();

    let queue = LineQueue::new();
    let sent = spawn_file_reader(&path, queue.sender()).join().unwrap().unwrap();
    std::fs::remove_file(&path).unwrap();

    let mut pipeline = Pipeline::default();
    for line in queue.drain() {
        pipeline.push_line(line);
    }
    let stats = pipeline.tick();
    assert_eq!(stats.lines, sent);
    assert_eq!(stats.entities, 4);
    assert_eq!(stats.icons, 3);
}
