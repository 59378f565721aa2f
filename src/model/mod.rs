pub mod events;
pub mod track;
pub mod gateway;
pub mod queue;
pub mod player;

use events::*;
use serenity::model::id::GuildId;
use serde_json::{
    json,
    Value
};
use crate::error::NodeResult;
use track::TrackDescriptor;

pub fn merge(a: &mut Value, b: Value) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                merge(a.entry(k).or_insert(Value::Null), v);
            }
        }

        (a, b) => *a = b,
    }
}

/// Playback control sent to a node for one guild.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Instruction {
    //Destroy the player
    Destroy,
    //Pause or resume the player
    Pause(Pause),
    //Play a track
    Play(Play),
    //Player connects to a given channel
    VoiceUpdate(VoiceUpdate),
}

impl Instruction {
    /// Plays `track` from the start, replacing whatever the node is playing.
    pub fn play(track: &TrackDescriptor) -> Self {
        Self::Play(Play {
            track: track.encoded.clone(),
            no_replace: false,
            start_time: 0,
        })
    }

    pub fn pause(pause: bool) -> Self {
        Self::Pause(Pause { pause })
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::Pause(_) => "pause",
            Self::Play(_) => "play",
            Self::VoiceUpdate(_) => "voiceUpdate",
        }
    }

    pub fn payload(&self, guild_id: GuildId) -> NodeResult<Value> {
        let mut x = json!({
            "op" : self.op(),
            "guildId" : guild_id.to_string(),
        });

        let data = match self {
            Self::Destroy => None,
            Self::Pause(data) => Some(serde_json::to_value(data)?),
            Self::Play(data) => Some(serde_json::to_value(data)?),
            Self::VoiceUpdate(data) => Some(serde_json::to_value(data)?),
        };

        if let Some(data) = data {
            merge(&mut x, data);
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[test]
    fn play_payload_is_flat() {
        let track = TrackDescriptor {
            encoded: "QAAA".to_string(),
            title: "Song".to_string(),
            uri: None,
            author: None,
            duration: None,
            requester: UserId::new(1),
        };

        let payload = Instruction::play(&track).payload(GuildId::new(55)).unwrap();

        assert_eq!(
            payload,
            json!({
                "op": "play",
                "guildId": "55",
                "track": "QAAA",
                "noReplace": false,
                "startTime": 0
            })
        );
    }

    #[test]
    fn voice_update_payload_nests_event() {
        let instruction = Instruction::VoiceUpdate(VoiceUpdate {
            session_id: "session".to_string(),
            event: Event {
                token: "token".to_string(),
                endpoint: "eu-west.discord.media".to_string(),
                guild_id: "55".to_string(),
            },
        });

        let payload = instruction.payload(GuildId::new(55)).unwrap();

        assert_eq!(payload["op"], "voiceUpdate");
        assert_eq!(payload["sessionId"], "session");
        assert_eq!(payload["event"]["endpoint"], "eu-west.discord.media");
    }

    #[test]
    fn unit_ops_carry_only_guild() {
        assert_eq!(
            Instruction::Destroy.payload(GuildId::new(3)).unwrap(),
            json!({ "op": "destroy", "guildId": "3" })
        );
        assert_eq!(
            Instruction::pause(true).payload(GuildId::new(3)).unwrap(),
            json!({ "op": "pause", "guildId": "3", "pause": true })
        );
    }
}
