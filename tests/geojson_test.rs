use geocluster::{ClusterIndex, NodeKind, Options, Position};
use geojson::{Feature, FeatureCollection, Value};

/// A GeoJSON feature used as a cluster input.
struct Place(Feature);

impl Place {
    fn name(&self) -> Option<&str> {
        self.0
            .properties
            .as_ref()
            .and_then(|properties| properties.get("name"))
            .and_then(|name| name.as_str())
    }

    fn coordinate(&self, axis: usize) -> Option<f64> {
        match &self.0.geometry {
            Some(geometry) => match &geometry.value {
                Value::Point(position) => position.get(axis).copied(),
                _ => None,
            },
            None => None,
        }
    }
}

impl Position for Place {
    fn lng(&self) -> Option<f64> {
        self.coordinate(0)
    }

    fn lat(&self) -> Option<f64> {
        self.coordinate(1)
    }
}

fn load_places() -> Vec<Place> {
    let json = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "name": "Alexanderplatz" },
                "geometry": { "type": "Point", "coordinates": [13.38, 52.52] }
            },
            {
                "type": "Feature",
                "properties": { "name": "Tempelhof" },
                "geometry": { "type": "Point", "coordinates": [13.39, 52.51] }
            },
            {
                "type": "Feature",
                "properties": { "name": "Nowhere" },
                "geometry": null
            },
            {
                "type": "Feature",
                "properties": { "name": "Battery Park" },
                "geometry": { "type": "Point", "coordinates": [-74.0, 40.7] }
            }
        ]
    }"#;
    let collection: FeatureCollection =
        serde_json::from_str(json).expect("feature collection parses");

    collection.features.into_iter().map(Place).collect()
}

#[test]
fn test_clusters_geojson_features() {
    let mut index = ClusterIndex::new(Options::default());

    index.load(load_places()).unwrap();

    // The feature without geometry is dropped.
    let unclustered = index.get_clusters([-180.0, -90.0, 180.0, 90.0], 17);

    assert_eq!(unclustered.len(), 3);

    // At city scale the two Berlin stops merge; New York stays alone.
    let nodes = index.get_clusters([-180.0, -90.0, 180.0, 90.0], 10);

    assert_eq!(nodes.len(), 2);

    let cluster = nodes.iter().find(|n| n.is_cluster()).expect("Berlin pair");
    let point = nodes.iter().find(|n| !n.is_cluster()).expect("lone point");

    assert_eq!(cluster.count(), 2);
    assert_eq!(
        index.point(point).and_then(Place::name),
        Some("Battery Park")
    );

    let mut names: Vec<&str> = index
        .get_leaves(cluster.cluster_id().unwrap(), 10, 0)
        .unwrap()
        .iter()
        .filter_map(|leaf| index.point(leaf).and_then(Place::name))
        .collect();
    names.sort_unstable();

    assert_eq!(names, vec!["Alexanderplatz", "Tempelhof"]);
}

#[test]
fn test_dropped_features_keep_input_indices_stable() {
    let mut index = ClusterIndex::new(Options::default());

    index.load(load_places()).unwrap();

    for node in index.get_clusters([-180.0, -90.0, 180.0, 90.0], 17) {
        let NodeKind::Point { index: slot } = node.kind else {
            panic!("no clusters above max zoom");
        };

        // Each leaf still points at its original feature.
        let place = &index.points()[slot];
        let lng = place.lng().expect("indexed features have coordinates");

        assert!((geocluster::lng_x(lng) - node.x).abs() < 1e-12);
        assert_ne!(place.name(), Some("Nowhere"));
    }
}
