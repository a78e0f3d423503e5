//! Argument vector construction for the external converter script.
//!
//! The script's option parser is order-sensitive, so the flag order below is
//! fixed: `-i`, `-o`, `-a`, `-f`, `-j`, then `-n`, `-k`, `-F`.

use crate::model::{JobOptions, ScriptInvocation};

/// Build the full argv (interpreter first) for one job. Never fails; option
/// values are passed through verbatim.
pub fn build_argv(invocation: &ScriptInvocation, options: &JobOptions) -> Vec<String> {
    let mut argv = vec![
        invocation.interpreter.clone(),
        invocation.script.to_string_lossy().into_owned(),
    ];

    argv.push("-i".into());
    argv.push(options.input_dir.to_string_lossy().into_owned());

    if let Some(out) = options.effective_output_dir() {
        argv.push("-o".into());
        argv.push(out.to_string_lossy().into_owned());
    }

    argv.push("-a".into());
    argv.push(options.audio_codec.clone());
    argv.push("-f".into());
    argv.push(options.container_format.clone());
    argv.push("-j".into());
    argv.push(options.parallelism.to_string());

    if options.dry_run {
        argv.push("-n".into());
    }
    if options.keep_originals {
        argv.push("-k".into());
    }
    if options.force {
        argv.push("-F".into());
    }

    argv
}

/// Render an argv for display in the log ("Executing: ...").
pub fn display_argv(argv: &[String]) -> String {
    argv.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn invocation() -> ScriptInvocation {
        ScriptInvocation::new("bash", "/opt/converter/convert.sh")
    }

    #[test]
    fn builds_documented_dry_run_argv() {
        let mut opts = JobOptions::new("/tmp/in");
        opts.output_dir = Some(PathBuf::new());
        opts.audio_codec = "aac".into();
        opts.container_format = "mp4".into();
        opts.parallelism = 2;
        opts.dry_run = true;

        let argv = build_argv(&invocation(), &opts);
        assert_eq!(
            argv,
            vec![
                "bash",
                "/opt/converter/convert.sh",
                "-i",
                "/tmp/in",
                "-a",
                "aac",
                "-f",
                "mp4",
                "-j",
                "2",
                "-n"
            ]
        );
    }

    #[test]
    fn output_flag_follows_input_when_present() {
        let mut opts = JobOptions::new("/media/raw");
        opts.output_dir = Some(PathBuf::from("/media/done"));

        let argv = build_argv(&invocation(), &opts);
        assert_eq!(argv[2..6], ["-i", "/media/raw", "-o", "/media/done"]);
        assert_eq!(argv.iter().filter(|a| *a == "-o").count(), 1);
    }

    #[test]
    fn output_flag_absent_when_unset() {
        let opts = JobOptions::new("/media/raw");
        let argv = build_argv(&invocation(), &opts);
        assert!(!argv.iter().any(|a| a == "-o"));
        assert_eq!(argv[3], "/media/raw");
    }

    #[test]
    fn optional_flags_keep_fixed_relative_order() {
        for mask in 0u8..8 {
            let mut opts = JobOptions::new("/in");
            opts.dry_run = mask & 1 != 0;
            opts.keep_originals = mask & 2 != 0;
            opts.force = mask & 4 != 0;

            let argv = build_argv(&invocation(), &opts);
            let tail: Vec<&str> = argv
                .iter()
                .skip_while(|a| *a != "-j")
                .skip(2)
                .map(String::as_str)
                .collect();

            let expected: Vec<&str> = [
                ("-n", opts.dry_run),
                ("-k", opts.keep_originals),
                ("-F", opts.force),
            ]
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(flag, _)| flag)
            .collect();
            assert_eq!(tail, expected, "mask {mask:03b}");
        }
    }

    #[test]
    fn unknown_codec_and_format_pass_through() {
        let mut opts = JobOptions::new("/in");
        opts.audio_codec = "flac --weird".into();
        opts.container_format = "webm".into();
        opts.parallelism = 99;

        let argv = build_argv(&invocation(), &opts);
        assert_eq!(argv[4..], ["-a", "flac --weird", "-f", "webm", "-j", "99"]);
    }

    #[test]
    fn display_joins_with_spaces() {
        let argv = build_argv(&invocation(), &JobOptions::new("/in"));
        assert_eq!(
            display_argv(&argv),
            "bash /opt/converter/convert.sh -i /in -a lpcm -f mov -j 1"
        );
    }
}
