use resin_core::{Array, Error, MoldConfig, Node, Region};
use resin_mmap::{MmapConfig, MmapError, MmapRegion, open};
use tempfile::TempDir;

fn sample_root() -> Node {
    Node::array(vec![
        Node::string("config"),
        Node::Integer(42),
        Node::binary(vec![0xDE, 0xAD]),
        Node::composite(Node::Param(0), vec![Node::Bool(true), Node::string("x")]),
    ])
}

#[test]
fn root_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");

    let written = {
        let mold = open(&path, MmapConfig::default(), MoldConfig::default()).unwrap();
        let root = mold.set(&sample_root()).unwrap();
        mold.flush().unwrap();
        root
    };

    let mold = open(&path, MmapConfig::default(), MoldConfig::default()).unwrap();
    assert_eq!(mold.root_reference().unwrap(), written);
    assert_eq!(mold.root().unwrap(), Some(sample_root()));
}

#[test]
fn writes_append_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");

    let (first, used) = {
        let mold = open(&path, MmapConfig::default(), MoldConfig::default()).unwrap();
        let first = mold.put(&Node::string("first")).unwrap();
        (first, mold.stats().used)
    };

    let mold = open(&path, MmapConfig::default(), MoldConfig::default()).unwrap();
    assert_eq!(mold.stats().used, used);
    let second = mold.put(&Node::string("second")).unwrap();
    assert!(second.payload() > first.payload());
    assert_eq!(mold.get(first).unwrap(), Node::string("first"));
    assert_eq!(mold.get(second).unwrap(), Node::string("second"));
}

#[test]
fn read_only_reopen_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");
    {
        let mold = open(&path, MmapConfig::default(), MoldConfig::default()).unwrap();
        mold.set(&sample_root()).unwrap();
    }

    let config = MmapConfig::default().with_read_only(true);
    let mold = open(&path, config, MoldConfig::default()).unwrap();
    assert!(mold.is_read_only());
    assert_eq!(mold.root().unwrap(), Some(sample_root()));
    assert!(matches!(
        mold.put(&Node::Integer(1)),
        Err(Error::ReadOnlyViolation)
    ));
    assert!(matches!(
        mold.set(&Node::Void),
        Err(Error::ReadOnlyViolation)
    ));
}

#[test]
fn readers_share_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");
    {
        let mold = open(&path, MmapConfig::default(), MoldConfig::default()).unwrap();
        mold.set(&Node::string("shared")).unwrap();
    }

    let config = MmapConfig::default().with_read_only(true);
    let first = open(&path, config.clone(), MoldConfig::default()).unwrap();
    let second = open(&path, config, MoldConfig::default()).unwrap();
    assert_eq!(first.root().unwrap(), second.root().unwrap());
    assert!(matches!(
        MmapRegion::open(&path, MmapConfig::default()),
        Err(MmapError::Locked { .. })
    ));
}

#[test]
fn empty_file_cannot_open_read_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");
    drop(MmapRegion::open(&path, MmapConfig::default()).unwrap());

    let config = MmapConfig::default().with_read_only(true);
    assert!(matches!(
        open(&path, config, MoldConfig::default()),
        Err(MmapError::Mold(Error::ReadOnlyViolation))
    ));
}

#[test]
fn garbage_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");
    std::fs::write(&path, [0xAB; 64]).unwrap();

    assert!(matches!(
        open(&path, MmapConfig::default(), MoldConfig::default()),
        Err(MmapError::Mold(Error::CorruptHeader(_)))
    ));
}

#[test]
fn file_grows_with_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.resin");
    let config = MmapConfig::default().with_initial_size(256);
    let mold = open(&path, config, MoldConfig::default().with_grow_step(256)).unwrap();

    let items: Vec<Node> = (0..500).map(|i| Node::string(&format!("item-{i}"))).collect();
    let reference = mold.put(&Node::Array(Array::indexed(items.clone()).unwrap())).unwrap();
    mold.flush().unwrap();

    let stats = mold.stats();
    assert!(stats.capacity >= stats.used);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), stats.capacity);

    let Node::Array(array) = mold.get(reference).unwrap() else {
        panic!("expected an array");
    };
    assert!(array.is_indexed());
    assert_eq!(array.len(), 500);
    assert_eq!(array.get(321).unwrap(), items[321]);
    assert_eq!(
        array.find(&Node::string("item-499"), 0, 500, true).unwrap(),
        Some(499)
    );
}

#[test]
fn region_is_usable_directly() {
    let dir = TempDir::new().unwrap();
    let region = MmapRegion::open(dir.path().join("raw.resin"), MmapConfig::default()).unwrap();
    assert_eq!(region.size(), 0);
    let mold = resin_core::Mold::new(region).unwrap();
    let reference = mold.put(&Node::Decimal(2.5)).unwrap();
    assert_eq!(mold.get(reference).unwrap(), Node::Decimal(2.5));
}
