use mulifs::node::OpenFlags;
use mulifs::types::{Container, EntryKind};
use std::fs;

use crate::library;

#[test]
fn created_playlist_is_normalized_and_listed() {
    let (_dir, library) = library();
    let name = library.playlists().create_playlist("My Mix ").unwrap();
    assert_eq!(name, "My_Mix");

    let playlists = library.listing().list_playlists().unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].name, "My_Mix");
    assert_eq!(playlists[0].kind, EntryKind::Directory);
    assert!(library
        .container_exists(&Container::Playlist("My_Mix".into()))
        .unwrap());
}

#[test]
fn recorded_song_resolves_and_reads_through_node() {
    let (dir, library) = library();
    let song = dir.path().join("a.mp3");
    fs::write(&song, b"not really audio").unwrap();

    library.playlists().create_playlist("mix").unwrap();
    library
        .playlists()
        .add_to_playlist("mix", "track1", &song)
        .unwrap();

    let container = Container::Playlist("mix".into());
    assert_eq!(
        library.resolver().resolve(&container, "track1").unwrap(),
        song
    );

    let node = library.node(container, "track1");
    assert_eq!(node.attr().unwrap().size, 16);
    let handle = node.open(OpenFlags::read_only()).unwrap();
    assert_eq!(handle.read(4, 6).unwrap(), b"really");
    handle.release().unwrap();
}

#[test]
fn listing_merges_recorded_and_disk_entries() {
    let (dir, library) = library();
    let song = dir.path().join("a.mp3");
    fs::write(&song, b"x").unwrap();
    library.playlists().create_playlist("mix").unwrap();
    library
        .playlists()
        .add_to_playlist("mix", "track1", &song)
        .unwrap();

    let loose = library.root().join("playlists").join("mix");
    fs::create_dir_all(&loose).unwrap();
    fs::write(loose.join("loose.ogg"), b"y").unwrap();

    let names: Vec<String> = library
        .listing()
        .list_entries(&Container::Playlist("mix".into()))
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["track1".to_string(), "loose.ogg".to_string()]);
}

#[test]
fn playlist_file_tracks_added_songs() {
    let (dir, library) = library();
    let song = dir.path().join("a.mp3");
    fs::write(&song, b"x").unwrap();
    library.playlists().create_playlist("mix").unwrap();
    library
        .playlists()
        .add_to_playlist("mix", "track1", &song)
        .unwrap();

    let m3u = fs::read_to_string(library.root().join("playlists").join("mix.m3u")).unwrap();
    assert!(m3u.starts_with("#EXTM3U\n"));
    assert!(m3u.contains("#EXTINF:-1,track1\n"));
    assert!(m3u.contains(&song.to_string_lossy().into_owned()));
}

#[test]
fn description_is_synthesized_for_playlists() {
    let (_dir, library) = library();
    library.playlists().create_playlist("mix").unwrap();
    let node = library.node(Container::Playlist("mix".into()), ".description");

    let handle = node.open(OpenFlags::read_only()).unwrap();
    let text = String::from_utf8(handle.read(0, 4096).unwrap()).unwrap();
    assert!(text.contains("\"kind\": \"playlist\""));
    assert!(text.contains("\"name\": \"mix\""));
    handle.release().unwrap();

    assert!(node.open(OpenFlags::write_only()).is_err());
}

#[test]
fn unknown_playlist_entry_is_not_found() {
    let (_dir, library) = library();
    library.playlists().create_playlist("mix").unwrap();
    let node = library.node(Container::Playlist("mix".into()), "ghost");
    let err = node.open(OpenFlags::read_only()).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
}
