use clap::{CommandFactory, Parser};
use mulifs::tooling::cli::{Cli, Commands, PlaylistCommands};

#[test]
fn parse_valid_command_matrix() {
    let cases: Vec<Vec<&str>> = vec![
        vec!["mulifs", "mount", "/mnt/music"],
        vec!["mulifs", "--root", "/srv/music", "mount", "--allow-other"],
        vec!["mulifs", "playlist", "create", "Road Trip"],
        vec!["mulifs", "playlist", "add", "mix", "track1", "/music/a.mp3"],
        vec!["mulifs", "playlist", "list"],
        vec!["mulifs", "playlist", "songs", "mix"],
        vec!["mulifs", "artists"],
        vec!["mulifs", "artists", "Someone"],
        vec!["mulifs", "resolve", "playlists/mix/track1"],
        vec!["mulifs", "ingest", "./song.mp3"],
        vec!["mulifs", "--log-level", "debug", "config"],
    ];

    for args in cases {
        let parsed = Cli::try_parse_from(args.clone());
        assert!(parsed.is_ok(), "expected valid parse for args: {args:?}");
    }
}

#[test]
fn parse_rejects_incomplete_playlist_add() {
    assert!(Cli::try_parse_from(["mulifs", "playlist", "add", "mix", "track1"]).is_err());
    assert!(Cli::try_parse_from(["mulifs", "playlist"]).is_err());
}

#[test]
fn global_store_flag_is_accepted_after_subcommand() {
    let cli = Cli::try_parse_from(["mulifs", "playlist", "list", "--store", "/tmp/store"]).unwrap();
    assert_eq!(cli.store.as_deref(), Some(std::path::Path::new("/tmp/store")));
    assert!(matches!(
        cli.command,
        Commands::Playlist {
            command: PlaylistCommands::List
        }
    ));
}

#[test]
fn command_definition_is_consistent() {
    Cli::command().debug_assert();
}
