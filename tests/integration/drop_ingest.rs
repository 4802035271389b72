use mulifs::node::OpenFlags;
use mulifs::types::Container;
use std::fs;

use crate::library;

#[test]
fn dropped_file_moves_into_unknown_album() {
    let (_dir, library) = library();
    let node = library.node(Container::Drop, "notes.txt");
    let handle = node
        .create(OpenFlags::write_only().with_truncate())
        .unwrap();
    assert_eq!(handle.write(0, b"liner notes").unwrap(), 11);
    handle.flush().unwrap();
    handle.release().unwrap();

    assert!(!library.root().join("drop").join("notes.txt").exists());

    let album = Container::album("Unknown_Artist", "Unknown_Album");
    let moved = library.resolver().resolve(&album, "notes.txt").unwrap();
    assert_eq!(moved, library.root().join("Unknown_Artist/Unknown_Album/notes.txt"));
    assert_eq!(fs::read(&moved).unwrap(), b"liner notes");

    let artists = library.listing().list_containers(&mulifs::types::BucketPath::artists()).unwrap();
    assert_eq!(artists[0].name, "Unknown_Artist");
}

#[test]
fn second_drop_with_same_title_gets_suffix() {
    let (_dir, library) = library();
    for body in [&b"one"[..], &b"two"[..]] {
        let handle = library
            .node(Container::Drop, "notes.txt")
            .create(OpenFlags::write_only().with_truncate())
            .unwrap();
        handle.write(0, body).unwrap();
        handle.release().unwrap();
    }

    let album = Container::album("Unknown_Artist", "Unknown_Album");
    let first = library.resolver().resolve(&album, "notes.txt").unwrap();
    let second = library.resolver().resolve(&album, "notes_2.txt").unwrap();
    assert_eq!(fs::read(first).unwrap(), b"one");
    assert_eq!(fs::read(second).unwrap(), b"two");
}

#[test]
fn files_cannot_be_created_directly_under_an_artist() {
    let (_dir, library) = library();
    let err = library
        .node(Container::Artist("Someone".into()), "song.mp3")
        .create(OpenFlags::write_only())
        .unwrap_err();
    assert_eq!(err.errno(), libc::EPERM);
}
