//! End-to-end behavior through `rush -c`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A rush invocation with an isolated HOME so no ~/.rushrc interferes.
fn rush(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rush").unwrap();
    cmd.env("HOME", home.path());
    cmd
}

fn run_in(dir: &TempDir, script: &str) -> assert_cmd::assert::Assert {
    rush(dir).current_dir(dir.path()).arg("-c").arg(script).assert()
}

#[test]
fn simple_command_output() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo hello world")
        .success()
        .stdout("hello world\n");
}

#[test]
fn single_quotes_suppress_all_expansion() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo '$HOME * $(whoami)'")
        .success()
        .stdout("$HOME * $(whoami)\n");
}

#[test]
fn double_quotes_expand_but_do_not_split() {
    let home = TempDir::new().unwrap();
    run_in(&home, r#"X="a  b"; printf '[%s]' "$X" $X"#)
        .success()
        .stdout("[a  b][a][b]");
}

#[test]
fn pipeline_connects_stdout_to_stdin() {
    let home = TempDir::new().unwrap();
    run_in(&home, "printf 'one\\ntwo\\nthree\\n' | wc -l | tr -d ' '")
        .success()
        .stdout("3\n");
}

#[test]
fn pipeline_exit_code_is_last_segment() {
    let home = TempDir::new().unwrap();
    run_in(&home, "false | true").success();
    run_in(&home, "true | false").code(1);
}

#[test]
fn pipefail_reports_first_failure() {
    let home = TempDir::new().unwrap();
    run_in(&home, "set -o pipefail; false | true").code(1);
}

#[test]
fn command_substitution_basic_and_nested() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo $(echo hello)").success().stdout("hello\n");
    run_in(&home, "echo $(echo $(echo deep))")
        .success()
        .stdout("deep\n");
}

#[test]
fn backtick_substitution() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo `echo tick`").success().stdout("tick\n");
}

#[test]
fn substitution_word_splitting() {
    let home = TempDir::new().unwrap();
    // Unquoted: newline becomes a word break. Quoted: preserved.
    run_in(&home, "x=$(printf 'a\\nb'); echo $x")
        .success()
        .stdout("a b\n");
    run_in(&home, "x=$(printf 'a\\nb'); echo \"$x\"")
        .success()
        .stdout("a\nb\n");
}

#[test]
fn variable_expansion_and_last_status() {
    let home = TempDir::new().unwrap();
    run_in(&home, "FOO=bar; echo ${FOO}baz").success().stdout("barbaz\n");
    run_in(&home, "false; echo $?").success().stdout("1\n");
}

#[test]
fn exported_variables_reach_children() {
    let home = TempDir::new().unwrap();
    run_in(&home, "export GREETING=hi; printenv GREETING")
        .success()
        .stdout("hi\n");
}

#[test]
fn unexported_variables_do_not_reach_children() {
    let home = TempDir::new().unwrap();
    run_in(&home, "GREETING=hi; printenv GREETING").code(1);
}

#[test]
fn assignment_prefix_is_per_command() {
    let home = TempDir::new().unwrap();
    run_in(&home, "GREETING=hi printenv GREETING")
        .success()
        .stdout("hi\n");
}

#[test]
fn glob_expands_sorted() {
    let dir = TempDir::new().unwrap();
    for name in ["b.txt", "a.txt", "c.log"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    run_in(&dir, "echo *.txt").success().stdout("a.txt b.txt\n");
}

#[test]
fn glob_no_match_keeps_literal() {
    let dir = TempDir::new().unwrap();
    run_in(&dir, "echo *.zzz").success().stdout("*.zzz\n");
}

#[test]
fn glob_skips_hidden_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".hidden"), "").unwrap();
    std::fs::write(dir.path().join("shown"), "").unwrap();
    run_in(&dir, "echo *").success().stdout("shown\n");
}

#[test]
fn quoted_glob_is_literal() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "").unwrap();
    run_in(&dir, "echo '*.txt'").success().stdout("*.txt\n");
}

#[test]
fn redirections_roundtrip() {
    let dir = TempDir::new().unwrap();
    run_in(&dir, "echo first > out.txt; echo second >> out.txt; cat < out.txt")
        .success()
        .stdout("first\nsecond\n");
}

#[test]
fn command_not_found_is_127_and_isolated() {
    let home = TempDir::new().unwrap();
    run_in(&home, "definitely_not_a_command_xyz; echo still_alive $?")
        .success()
        .stdout("still_alive 127\n")
        .stderr(predicate::str::contains("command not found"));
}

#[test]
fn permission_denied_is_126() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("noexec"), "#!/bin/sh\necho nope\n").unwrap();
    run_in(&dir, "./noexec")
        .code(126)
        .stderr(predicate::str::contains("permission denied"));
}

#[test]
fn exit_builtin_sets_exit_code() {
    let home = TempDir::new().unwrap();
    run_in(&home, "exit 3").code(3);
    run_in(&home, "false; exit").code(1);
}

#[test]
fn and_or_chains_short_circuit() {
    let home = TempDir::new().unwrap();
    run_in(&home, "true && echo yes || echo no").success().stdout("yes\n");
    run_in(&home, "false && echo yes || echo no").success().stdout("no\n");
}

#[test]
fn if_else_branches() {
    let home = TempDir::new().unwrap();
    run_in(&home, "if false; then echo a; else echo b; fi")
        .success()
        .stdout("b\n");
    run_in(&home, "if false; then echo a; fi").success().stdout("");
}

#[test]
fn for_loop_iterates() {
    let home = TempDir::new().unwrap();
    run_in(&home, "for i in 1 2 3; do echo $i; done")
        .success()
        .stdout("1\n2\n3\n");
}

#[test]
fn for_loop_over_glob() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("x.dat"), "").unwrap();
    std::fs::write(dir.path().join("y.dat"), "").unwrap();
    run_in(&dir, "for f in *.dat; do echo got $f; done")
        .success()
        .stdout("got x.dat\ngot y.dat\n");
}

#[test]
fn while_false_never_runs() {
    let home = TempDir::new().unwrap();
    run_in(&home, "while false; do echo x; done").success().stdout("");
}

#[test]
fn while_loop_counts() {
    let home = TempDir::new().unwrap();
    run_in(
        &home,
        "i=0; while test $i -lt 3; do echo $i; i=$(expr $i + 1); done",
    )
    .success()
    .stdout("0\n1\n2\n");
}

#[test]
fn case_matches_glob_patterns() {
    let home = TempDir::new().unwrap();
    run_in(&home, "case hello in h*) echo first;; *) echo rest;; esac")
        .success()
        .stdout("first\n");
    run_in(&home, "case zzz in h*) echo first;; *) echo rest;; esac")
        .success()
        .stdout("rest\n");
}

#[test]
fn functions_bind_positionals() {
    let home = TempDir::new().unwrap();
    run_in(&home, "greet() { echo hello $1; }; greet world; echo after=$1")
        .success()
        .stdout("hello world\nafter=\n");
}

#[test]
fn subshell_does_not_leak_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    run_in(&dir, "(cd sub); pwd | grep -c sub; true")
        .success()
        .stdout(predicate::str::contains("0"));
}

#[test]
fn errexit_stops_the_line() {
    let home = TempDir::new().unwrap();
    run_in(&home, "set -e; false; echo unreachable")
        .code(1)
        .stdout("");
}

#[test]
fn errexit_spares_conditions() {
    let home = TempDir::new().unwrap();
    run_in(&home, "set -e; if false; then echo a; else echo b; fi; echo done")
        .success()
        .stdout("b\ndone\n");
}

#[test]
fn errexit_aborts_on_failed_substitution() {
    let home = TempDir::new().unwrap();
    run_in(&home, "set -e; echo before; echo $(false); echo after")
        .code(1)
        .stdout("before\n")
        .stderr(predicate::str::contains("command substitution failed"));
}

#[test]
fn substitution_failure_is_ignored_without_errexit() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo got:$(false)").success().stdout("got:\n");
}

#[test]
fn xtrace_traces_to_stderr() {
    let home = TempDir::new().unwrap();
    run_in(&home, "set -x; echo traced")
        .success()
        .stdout("traced\n")
        .stderr(predicate::str::contains("+ echo traced"));
}

#[test]
fn background_job_is_listed() {
    let home = TempDir::new().unwrap();
    run_in(&home, "sleep 2 & jobs")
        .success()
        .stdout(predicate::str::contains("Running").and(predicate::str::contains("sleep 2")));
}

#[test]
fn background_returns_immediately() {
    let home = TempDir::new().unwrap();
    let start = std::time::Instant::now();
    run_in(&home, "sleep 5 &").success();
    assert!(start.elapsed() < std::time::Duration::from_secs(4));
}

#[test]
fn unterminated_quote_is_a_syntax_error() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo 'unterminated")
        .code(2)
        .stderr(predicate::str::contains("unexpected end of input"));
}

#[test]
fn empty_pipeline_segment_is_rejected() {
    let home = TempDir::new().unwrap();
    run_in(&home, "| cat")
        .code(2)
        .stderr(predicate::str::contains("empty pipeline segment"));
}

#[test]
fn escaped_space_makes_one_argument() {
    let home = TempDir::new().unwrap();
    run_in(&home, r"printf '[%s]' foo\ bar").success().stdout("[foo bar]");
}

#[test]
fn comments_are_ignored() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo visible # echo invisible")
        .success()
        .stdout("visible\n");
}

#[test]
fn multiline_script_on_stdin() {
    let home = TempDir::new().unwrap();
    rush(&home)
        .write_stdin("for i in a b\ndo\n  echo $i\ndone\n")
        .assert()
        .success()
        .stdout("a\nb\n");
}

#[test]
fn script_file_with_positional_parameters() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("greet.rush");
    std::fs::write(&script, "echo $0 says hello to $1\n").unwrap();
    rush(&dir)
        .arg(script.to_str().unwrap())
        .arg("world")
        .assert()
        .success()
        .stdout(predicate::str::contains("says hello to world"));
}

#[test]
fn dollar_dollar_is_a_pid() {
    let home = TempDir::new().unwrap();
    run_in(&home, "echo $$")
        .success()
        .stdout(predicate::str::is_match(r"^\d+\n$").unwrap());
}
