//! 비대칭 핸드쉐이크
//!
//! 클라이언트 공개키 → 서버가 세션 키 생성 및 봉인 → 클라이언트가 봉인 해제.
//! 성공하면 양측이 같은 세션 키를 갖고, 수동 관찰자는 이를 알 수 없다.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::crypto::{
    parse_public_key, seal_session_key, CryptoError, HandshakeKeyPair, SealedSessionKey,
    SessionKey,
};
use crate::frame::FramedStream;
use crate::keystore::{PeerAddress, SessionKeyStore};
use crate::message::Message;
use crate::Result;

/// 서버측 처리: 새 세션 키를 저장소에 등록하고 봉인된 응답 반환
///
/// 같은 피어의 기존 키는 덮어쓴다.
pub fn respond(
    store: &SessionKeyStore,
    peer: PeerAddress,
    public_key: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let public_key =
        public_key.ok_or_else(|| CryptoError::InvalidKey("missing public key".into()))?;
    let peer_public = parse_public_key(public_key)?;

    let key = SessionKey::generate();
    let response = seal_session_key(&peer_public, &key)?.to_bytes()?;

    if store.put(peer, key).is_some() {
        debug!("피어 {} 재핸드쉐이크: 기존 세션 키 교체", peer);
    }
    Ok(response)
}

/// 클라이언트측 처리: 키쌍 생성, 공개키 전송, 응답에서 세션 키 복원
///
/// 키쌍은 이 호출 안에서만 살아 있으며 실패 시 그대로 폐기된다.
pub async fn initiate<S>(framed: &mut FramedStream<S>) -> Result<SessionKey>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let keypair = HandshakeKeyPair::generate();
    framed
        .send_message(&Message::handshake(&keypair.public_key_bytes()))
        .await?;

    let response = framed.recv().await?;
    let sealed = SealedSessionKey::from_bytes(&response)?;
    Ok(keypair.open_session_key(&sealed)?)
}
