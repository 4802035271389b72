use mulifs::node::{NodeKind, OpenFlags};
use mulifs::types::Container;

use crate::library;

#[test]
fn finder_metadata_survives_release() {
    let (_dir, library) = library();
    library.playlists().create_playlist("mix").unwrap();
    let container = Container::Playlist("mix".into());
    let node = library.node(container.clone(), ".DS_Store");
    assert_eq!(node.kind(), NodeKind::Special);

    let handle = node.create(OpenFlags::read_write().with_truncate()).unwrap();
    handle.write(0, b"finder").unwrap();
    handle.flush().unwrap();
    handle.release().unwrap();

    let again = library.node(container, ".DS_Store");
    assert_eq!(again.attr().unwrap().size, 6);
    let reader = again.create(OpenFlags::read_only()).unwrap();
    assert_eq!(reader.read(0, 64).unwrap(), b"finder");
    reader.release().unwrap();
}

#[test]
fn special_files_cannot_be_opened_without_create() {
    let (_dir, library) = library();
    let node = library.node(Container::Drop, "._cover.jpg");
    assert_eq!(
        node.open(OpenFlags::read_only()).unwrap_err().errno(),
        libc::EPERM
    );
}

#[test]
fn other_dotfiles_are_hidden() {
    let (_dir, library) = library();
    let node = library.node(Container::Drop, ".Trashes");
    assert_eq!(node.kind(), NodeKind::Hidden);
    assert_eq!(node.attr().unwrap_err().errno(), libc::ENOENT);
}
