use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nmb_tmi::expect::{ExpectOptions, Expector};
use nmb_tmi::IrcMessage;
use serde_json::json;

const LINES: &[&str] = &[
  "@badge-info=subscriber/8;badges=subscriber/6,premium/1;color=#FF4500;display-name=Forsen;emotes=;first-msg=0;flags=;id=b50bf8b8-e6ad-4d8f-8b4b-2a4f6a10fb34;mod=0;returning-chatter=0;room-id=22484632;subscriber=1;tmi-sent-ts=1696970981437;turbo=0;user-id=22484632;user-type= :forsen!forsen@forsen.tmi.twitch.tv PRIVMSG #forsen :xqcL",
  "@emote-only=0;followers-only=-1;r9k=0;room-id=22484632;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #forsen",
  "@badge-info=;badges=moderator/1;color=;display-name=bot;emote-sets=0;mod=1;subscriber=0;user-type=mod :tmi.twitch.tv USERSTATE #forsen",
  ":bot!bot@bot.tmi.twitch.tv JOIN #forsen",
  ":tmi.twitch.tv PONG tmi.twitch.tv :1696970981437",
  "PING :tmi.twitch.tv",
  "@msg-id=msg_ratelimit :tmi.twitch.tv NOTICE #forsen :You are sending messages too quickly.",
];

fn input() -> Vec<&'static str> {
  LINES.iter().copied().cycle().take(1000).collect()
}

fn parse(c: &mut Criterion) {
  let input = input();
  c.bench_with_input(BenchmarkId::new("parse", "1000 lines"), &input, |b, lines| {
    b.iter(|| {
      for line in lines {
        black_box(nmb_tmi::irc::parse(line).expect("failed to parse"));
      }
    });
  });
}

fn expect(c: &mut Criterion) {
  let messages = input()
    .into_iter()
    .map(|line| nmb_tmi::irc::parse(line).expect("failed to parse"))
    .collect::<Vec<_>>();
  c.bench_with_input(
    BenchmarkId::new("expect", "1000 lines, 10 patterns"),
    &messages,
    |b, messages| {
      b.iter_with_setup(
        || {
          let mut expector = Expector::<IrcMessage>::new();
          for channel in ["#forsen", "#pajlada", "#xqcow", "#sodapoppin", "#lirik"] {
            expector.expect(
              json!({ "cmd": "ROOMSTATE", "params": [channel] }),
              ExpectOptions::persistent(),
              |_| {},
            );
            expector.expect(
              json!({ "cmd": "PRIVMSG", "tags": { "mod": "1" }, "params": [channel] }),
              ExpectOptions::persistent(),
              |_| {},
            );
          }
          expector
        },
        |mut expector| {
          for message in messages {
            black_box(expector.receive(message));
          }
        },
      );
    },
  );
}

criterion_group!(benches, parse, expect);
criterion_main!(benches);
